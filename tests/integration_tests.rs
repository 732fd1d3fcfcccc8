use std::path::PathBuf;

use luapack::bundler::Bundler;
use luapack::config::Config;

fn bundle_fixture(project: &str) -> String {
    let _ = env_logger::try_init();
    let entry = PathBuf::from(format!("tests/fixtures/{}/main.lua", project));
    assert!(entry.exists(), "fixture missing: {:?}", entry);
    let bundler = Bundler::new(Config::default());
    bundler.bundle(&entry).unwrap()
}

#[test]
fn test_basic_import() {
    let out = bundle_fixture("simple_project");
    assert_eq!(
        out,
        concat!(
            "local function add(a, b)\n",
            "    return a + b\n",
            "end\n",
            "local total = add(2, 3)\n",
            "print(total)\n",
        )
    );
}

#[test]
fn test_alias_rename() {
    let out = bundle_fixture("alias_project");
    // The alias dissolves into the exporter's real identifier.
    assert_eq!(out, "local veryLongName = 1\nprint(veryLongName)\n");
}

#[test]
fn test_conflict_cascade() {
    let out = bundle_fixture("conflict_project");
    // a's export moved to config2; b's own local kept the spelling.
    assert_eq!(
        out,
        concat!(
            "local config2 = {a = 1}\n",
            "local config = {b = 2}\n",
            "local function describe()\n",
            "    return config.b\n",
            "end\n",
            "print(config2.a, describe())\n",
        )
    );
}

#[test]
fn test_metatable_ordering() {
    let out = bundle_fixture("metatable_project");
    let index_assign = out
        .find("Point.__index = Point")
        .expect("member assignment survived");
    let first_setmetatable = out.find("setmetatable").expect("constructor survived");
    assert!(
        index_assign < first_setmetatable,
        "metatable wiring must precede every setmetatable call:\n{}",
        out
    );
    // Entry statements stay at the bottom in source order.
    let p_decl = out.find("local p = Point:new(1, 2)").unwrap();
    let print_stmt = out.find("print(p.x, origin().y)").unwrap();
    assert!(index_assign < p_decl && p_decl < print_stmt);
}

#[test]
fn test_circular_import() {
    let out = bundle_fixture("circular_project");
    assert_eq!(out.matches("function ping").count(), 1);
    assert_eq!(out.matches("function pong").count(), 1);
    // Both declarations reach top level before the entry's runtime call.
    let ping_decl = out.find("local function ping").unwrap();
    let pong_decl = out.find("local function pong").unwrap();
    let call = out.find("print(ping(5))").unwrap();
    assert!(ping_decl < call && pong_decl < call);
}

#[test]
fn test_directory_index_resolution() {
    let out = bundle_fixture("lib_root");
    assert_eq!(out, "local utils = {version = \"1.0\"}\nprint(utils.version)\n");
}
