use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use recompiler_core::dependency_host::collect_dependencies;
use recompiler_core::{EntryPointFormat, ModuleResolver};
use recompiler_hosts::{get_host, typings_host};
use tempfile::TempDir;

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn setup() -> (TempDir, PathBuf) {
    let temp = TempDir::new().unwrap();
    let nm = fs::canonicalize(temp.path()).unwrap().join("node_modules");
    write(&nm.join("core/package.json"), r#"{ "name": "core" }"#);
    write(&nm.join("core/index.js"), "");
    write(&nm.join("@scope/util/package.json"), r#"{ "name": "@scope/util" }"#);
    write(&nm.join("loose/internal/helper.js"), "");
    (temp, nm)
}

fn set(paths: &[PathBuf]) -> BTreeSet<PathBuf> {
    paths.iter().cloned().collect()
}

#[test]
fn test_esm_follows_relative_imports() {
    let (_temp, nm) = setup();
    let lib = nm.join("lib");
    write(
        &lib.join("fesm2015/index.js"),
        "import { a } from './a';\nimport fs from 'fs';\nexport * from 'core';\n",
    );
    write(
        &lib.join("fesm2015/a.js"),
        "import { b } from '@scope/util';\nimport { c } from 'loose/internal/helper';\nimport { d } from 'not-installed';\nexport { a };\n",
    );

    let host = get_host(&EntryPointFormat::Esm2015);
    let info = collect_dependencies(
        host.as_ref(),
        &ModuleResolver::new(None),
        &lib.join("fesm2015/index.js"),
    );

    assert_eq!(info.dependencies, set(&[nm.join("core"), nm.join("@scope/util")]));
    assert_eq!(info.deep_imports, set(&[nm.join("loose/internal/helper")]));
    assert_eq!(
        info.missing,
        ["not-installed".to_string()].into_iter().collect::<BTreeSet<_>>()
    );
}

#[test]
fn test_umd_and_commonjs_hosts() {
    let (_temp, nm) = setup();
    let lib = nm.join("lib");
    write(
        &lib.join("bundles/lib.umd.js"),
        "(function (g, f) { typeof define === 'function' && define.amd ? define(['exports', 'core'], f) : f(g.lib = {}, g.core); }(this, function (exports, core) {}));\n",
    );
    write(&lib.join("index.js"), "var util = require('@scope/util');\nrequire('./private');\n");
    write(&lib.join("private.js"), "module.exports = require('core');\n");

    let resolver = ModuleResolver::new(None);
    let umd = collect_dependencies(
        get_host(&EntryPointFormat::Umd).as_ref(),
        &resolver,
        &lib.join("bundles/lib.umd"),
    );
    assert_eq!(umd.dependencies, set(&[nm.join("core")]));

    let cjs = collect_dependencies(
        get_host(&EntryPointFormat::CommonJs).as_ref(),
        &resolver,
        &lib.join("index.js"),
    );
    assert_eq!(cjs.dependencies, set(&[nm.join("@scope/util"), nm.join("core")]));
    assert!(cjs.missing.is_empty());
}

#[test]
fn test_typings_fall_back_to_types_packages() {
    let (_temp, nm) = setup();
    write(&nm.join("@types/node-only/package.json"), r#"{ "name": "@types/node-only" }"#);
    write(&nm.join("@types/scope__typed/package.json"), r#"{ "name": "@types/scope__typed" }"#);
    let lib = nm.join("lib");
    write(
        &lib.join("index.d.ts"),
        "import { A } from 'node-only';\nimport { B } from '@scope/typed';\nexport * from './public_api';\n",
    );
    write(&lib.join("public_api.d.ts"), "export { C } from 'core';\n");

    let info = collect_dependencies(
        typings_host().as_ref(),
        &ModuleResolver::new(None),
        &lib.join("index.d.ts"),
    );

    assert_eq!(
        info.dependencies,
        set(&[
            nm.join("@types/node-only"),
            nm.join("@types/scope__typed"),
            nm.join("core"),
        ])
    );
    assert!(info.missing.is_empty());
}

#[test]
fn test_missing_entry_file_yields_nothing() {
    let (_temp, nm) = setup();
    let host = get_host(&EntryPointFormat::Esm5);
    let info = collect_dependencies(
        host.as_ref(),
        &ModuleResolver::new(None),
        &nm.join("absent/index.js"),
    );
    assert_eq!(info, Default::default());
}
