//! Token-level extraction of the `import`/`export` surface syntax.
//!
//! `import` and `export` are not Lua keywords, so the base lexer sees them
//! as plain names. This pass walks the token stream, records the declared
//! imports and exports, and produces a cleaned source with the surface
//! syntax blanked out. Blanked bytes become spaces (newlines survive), so
//! byte positions of the surrounding code are preserved and parser line
//! numbers stay truthful.

use anyhow::{Result, bail};

use crate::lexer::{Token, TokenKind, tokenize};

/// One name pulled from another module. `alias == name` when no `as`
/// rename appears.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportBinding {
    pub name: String,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub source_specifier: String,
    pub bindings: Vec<ImportBinding>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportDecl {
    pub names: Vec<String>,
}

#[derive(Debug)]
pub struct Extracted {
    pub imports: Vec<ImportDecl>,
    pub exports: Vec<ExportDecl>,
    pub cleaned_src: String,
}

/// Parse out the surface declarations of one module source.
pub fn extract(src: &str) -> Result<Extracted> {
    let tokens = tokenize(src)?;
    let mut imports = Vec::new();
    let mut exports = Vec::new();
    // Byte ranges to blank out of the source.
    let mut removals: Vec<(usize, usize)> = Vec::new();

    let mut i = 0;
    while tokens[i].kind != TokenKind::Eof {
        let token = &tokens[i];
        if token.kind == TokenKind::Name && !follows_member_access(&tokens, i) {
            match token.text(src) {
                "import" if tokens[i + 1].kind == TokenKind::Name => {
                    let (decl, end_index, end_byte) = parse_import(src, &tokens, i)?;
                    removals.push((token.start, end_byte));
                    imports.push(decl);
                    i = end_index;
                    continue;
                }
                "export" => {
                    match tokens[i + 1].kind {
                        TokenKind::Local => {
                            let names = parse_export(src, &tokens, i + 1)?;
                            // Only the `export` keyword is removed; the
                            // local declaration itself stays in the module.
                            removals.push((token.start, token.end));
                            exports.push(ExportDecl { names });
                            i += 1;
                            continue;
                        }
                        TokenKind::Name | TokenKind::Function => {
                            bail!(
                                "syntax error at line {}: 'export' must be followed by 'local'",
                                token.line
                            );
                        }
                        // Plain use of `export` as an identifier.
                        _ => {}
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }

    Ok(Extracted {
        imports,
        exports,
        cleaned_src: blank_ranges(src, &removals),
    })
}

/// True when the name at `index` is a member access (`t.import`) or a
/// declared name (`local export`, `function import`), not a statement
/// keyword of the surface syntax.
fn follows_member_access(tokens: &[Token], index: usize) -> bool {
    if index == 0 {
        return false;
    }
    matches!(
        tokens[index - 1].kind,
        TokenKind::Dot | TokenKind::Colon | TokenKind::Local | TokenKind::Function
    )
}

/// `import NAME [as ALIAS] {, NAME [as ALIAS]} from "SPECIFIER"`.
/// Returns the declaration, the token index just past it, and the byte
/// offset of its end.
fn parse_import(src: &str, tokens: &[Token], start: usize) -> Result<(ImportDecl, usize, usize)> {
    let line = tokens[start].line;
    let mut i = start + 1;
    let mut bindings = Vec::new();
    loop {
        if tokens[i].kind != TokenKind::Name {
            bail!("syntax error at line {}: expected a name in import", line);
        }
        let name = tokens[i].text(src).to_string();
        i += 1;
        let alias = if tokens[i].kind == TokenKind::Name && tokens[i].text(src) == "as" {
            i += 1;
            if tokens[i].kind != TokenKind::Name {
                bail!("syntax error at line {}: expected a name after 'as'", line);
            }
            let alias = tokens[i].text(src).to_string();
            i += 1;
            alias
        } else {
            name.clone()
        };
        bindings.push(ImportBinding { name, alias });
        if tokens[i].kind == TokenKind::Comma {
            i += 1;
            continue;
        }
        break;
    }
    if !(tokens[i].kind == TokenKind::Name && tokens[i].text(src) == "from") {
        bail!("syntax error at line {}: expected 'from' in import", line);
    }
    i += 1;
    if tokens[i].kind != TokenKind::Str {
        bail!(
            "syntax error at line {}: expected a string specifier after 'from'",
            line
        );
    }
    let specifier = match crate::ast::literal_string_value(tokens[i].text(src)) {
        Some(value) => value,
        None => bail!(
            "syntax error at line {}: import specifier must be a plain string",
            line
        ),
    };
    let end_byte = tokens[i].end;
    Ok((
        ImportDecl {
            source_specifier: specifier,
            bindings,
        },
        i + 1,
        end_byte,
    ))
}

/// The exported names of `export local ...`, with `index` at the `local`
/// token. The declaration itself is left for the base parser.
fn parse_export(src: &str, tokens: &[Token], index: usize) -> Result<Vec<String>> {
    let line = tokens[index].line;
    let mut i = index + 1;
    if tokens[i].kind == TokenKind::Function {
        i += 1;
        if tokens[i].kind != TokenKind::Name {
            bail!(
                "syntax error at line {}: expected a function name after 'export local function'",
                line
            );
        }
        return Ok(vec![tokens[i].text(src).to_string()]);
    }
    let mut names = Vec::new();
    loop {
        if tokens[i].kind != TokenKind::Name {
            bail!("syntax error at line {}: expected a name after 'export local'", line);
        }
        names.push(tokens[i].text(src).to_string());
        i += 1;
        if tokens[i].kind == TokenKind::Comma {
            i += 1;
            continue;
        }
        return Ok(names);
    }
}

fn blank_ranges(src: &str, removals: &[(usize, usize)]) -> String {
    let mut bytes = src.as_bytes().to_vec();
    for &(start, end) in removals {
        for byte in &mut bytes[start..end] {
            if *byte != b'\n' {
                *byte = b' ';
            }
        }
    }
    // All replaced bytes are ASCII spaces; multi-byte sequences are only
    // ever replaced whole, so this cannot fail.
    String::from_utf8(bytes).expect("blanking preserved utf-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_import() {
        let src = "import add from \"./math\"\nprint(add(2, 3))\n";
        let extracted = extract(src).unwrap();
        assert_eq!(extracted.imports.len(), 1);
        assert_eq!(extracted.imports[0].source_specifier, "./math");
        assert_eq!(
            extracted.imports[0].bindings,
            vec![ImportBinding {
                name: "add".to_string(),
                alias: "add".to_string()
            }]
        );
        assert_eq!(extracted.cleaned_src.len(), src.len());
        let (blanked, rest) = extracted.cleaned_src.split_once('\n').unwrap();
        assert!(blanked.trim().is_empty());
        assert_eq!(rest, "print(add(2, 3))\n");
    }

    #[test]
    fn test_import_with_alias_and_list() {
        let src = "import veryLongName as v, other from \"@/lib/util\"";
        let extracted = extract(src).unwrap();
        let bindings = &extracted.imports[0].bindings;
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].name, "veryLongName");
        assert_eq!(bindings[0].alias, "v");
        assert_eq!(bindings[1].name, "other");
        assert_eq!(bindings[1].alias, "other");
        assert!(extracted.cleaned_src.trim().is_empty());
    }

    #[test]
    fn test_export_local_binding() {
        let src = "export local config, debug = {}, false\nprint(config)\n";
        let extracted = extract(src).unwrap();
        assert_eq!(
            extracted.exports[0].names,
            vec!["config".to_string(), "debug".to_string()]
        );
        // Only the keyword is blanked; the declaration survives in place.
        assert_eq!(
            extracted.cleaned_src,
            "       local config, debug = {}, false\nprint(config)\n"
        );
    }

    #[test]
    fn test_export_local_function() {
        let src = "export local function add(a, b)\n    return a + b\nend\n";
        let extracted = extract(src).unwrap();
        assert_eq!(extracted.exports[0].names, vec!["add".to_string()]);
        assert!(extracted.cleaned_src.starts_with("       local function add"));
    }

    #[test]
    fn test_export_without_local_is_an_error() {
        assert!(extract("export function f() end").is_err());
        assert!(extract("export config = 1").is_err());
    }

    #[test]
    fn test_words_in_ordinary_positions_are_left_alone() {
        let src = "local export = 1\nt.import = 2\nprint(export, t.import)\n";
        let extracted = extract(src).unwrap();
        assert!(extracted.imports.is_empty());
        assert!(extracted.exports.is_empty());
        assert_eq!(extracted.cleaned_src, src);
    }

    #[test]
    fn test_positions_preserved() {
        let src = "import a from \"./a\"\nlocal x = 1\n";
        let extracted = extract(src).unwrap();
        assert_eq!(extracted.cleaned_src.len(), src.len());
        assert_eq!(
            src.find("local x").unwrap(),
            extracted.cleaned_src.find("local x").unwrap()
        );
    }
}
