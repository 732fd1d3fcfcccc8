use once_cell::sync::Lazy;
use std::collections::HashSet;

/// The Lua reserved words. None of these may ever be produced as an
/// identifier by the allocator or the mangler.
static KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "if", "in",
        "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
    ])
});

/// Globals of the Lua 5.1 standard environment. The rewriter leaves free
/// references to these untouched, and the mangler must never claim one of
/// them as a short name while a reference to it survives in the program.
static STD_GLOBALS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    let mut globals = HashSet::new();
    // Base library
    globals.insert("_G");
    globals.insert("_VERSION");
    globals.insert("assert");
    globals.insert("collectgarbage");
    globals.insert("dofile");
    globals.insert("error");
    globals.insert("getfenv");
    globals.insert("getmetatable");
    globals.insert("ipairs");
    globals.insert("load");
    globals.insert("loadfile");
    globals.insert("loadstring");
    globals.insert("next");
    globals.insert("pairs");
    globals.insert("pcall");
    globals.insert("print");
    globals.insert("rawequal");
    globals.insert("rawget");
    globals.insert("rawlen");
    globals.insert("rawset");
    globals.insert("require");
    globals.insert("select");
    globals.insert("setfenv");
    globals.insert("setmetatable");
    globals.insert("tonumber");
    globals.insert("tostring");
    globals.insert("type");
    globals.insert("unpack");
    globals.insert("xpcall");
    // Library tables
    globals.insert("coroutine");
    globals.insert("debug");
    globals.insert("io");
    globals.insert("math");
    globals.insert("os");
    globals.insert("package");
    globals.insert("string");
    globals.insert("table");
    globals.insert("bit32");
    globals.insert("utf8");
    globals.insert("arg");
    globals
});

pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(name)
}

pub fn is_std_global(name: &str) -> bool {
    STD_GLOBALS.contains(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords() {
        for kw in ["and", "end", "function", "repeat", "until"] {
            assert!(is_keyword(kw));
        }
        assert!(!is_keyword("import"));
        assert!(!is_keyword("export"));
        assert!(!is_keyword("goto"));
    }

    #[test]
    fn test_std_globals() {
        assert!(is_std_global("setmetatable"));
        assert!(is_std_global("print"));
        assert!(!is_std_global("my_helper"));
    }
}
