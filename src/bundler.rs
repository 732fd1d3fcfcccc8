//! The bundling pipeline.
//!
//! A pure function of (entry path, options, file-system snapshot): discover
//! the module graph, plan the renames, rewrite every statement, order the
//! items, and print. All mutable state lives in the per-invocation plan, so
//! bundling the same inputs twice yields byte-identical output.

use anyhow::{Context, Result};
use log::{debug, info};
use std::fs;
use std::path::Path;

use crate::allocator;
use crate::ast_rewriter;
use crate::config::Config;
use crate::emit;
use crate::graph;
use crate::mangler;
use crate::orderer;
use crate::parser;

pub struct Bundler {
    config: Config,
}

impl Bundler {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Bundle the program rooted at `entry_path` into a single source
    /// string.
    pub fn bundle(&self, entry_path: &Path) -> Result<String> {
        info!("bundling {}", entry_path.display());

        let graph = graph::discover(entry_path, &self.config.define)?;
        let mut plan = allocator::plan(&graph)?;
        debug!(
            "planned {} items across {} modules, {} names claimed",
            plan.items.len(),
            graph.modules.len(),
            plan.used_names.len()
        );

        let maps = &plan.maps;
        let global_rename = &plan.global_rename;
        for item in &mut plan.items {
            ast_rewriter::rewrite_statement(&mut item.stmt, &maps[item.module_idx], global_rename);
        }

        let order = orderer::order(&plan, &graph);
        let bundled = emit::format_beautiful(order.iter().map(|&idx| &plan.items[idx].stmt));

        if !self.config.minify {
            return Ok(bundled);
        }

        // The minify pipeline re-parses the beautiful text to rebuild scope
        // bookkeeping; a failure here is a rewriter bug, not user error.
        let mut stmts = parser::parse(&bundled)
            .context("internal error: re-parse of bundled output failed")?;
        mangler::mangle_program(&mut stmts, self.config.mangle, &plan.synthetic_names);
        Ok(emit::format_mini(&stmts))
    }

    /// Bundle and write the output file. Nothing is written unless the
    /// whole pipeline succeeded.
    pub fn bundle_to_file(&self, entry_path: &Path, output_path: &Path) -> Result<()> {
        let bundled = self.bundle(entry_path)?;
        fs::write(output_path, bundled)
            .with_context(|| format!("failed to write output file: {:?}", output_path))?;
        info!("bundle written to {}", output_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mangler::MangleMode;
    use indexmap::IndexMap;
    use std::path::Path;

    fn write(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_bundle_is_deterministic() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "main.lua",
            "import add from \"./math\"\nprint(add(2, 3))\n",
        );
        write(
            tmp.path(),
            "math.lua",
            "export local function add(a, b) return a + b end\n",
        );

        let bundler = Bundler::new(Config::default());
        let first = bundler.bundle(&tmp.path().join("main.lua")).unwrap();
        let second = bundler.bundle(&tmp.path().join("main.lua")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_minify_pipeline_produces_parseable_output() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "main.lua",
            "import greet from \"./greeting\"\nprint(greet(\"world\"))\n",
        );
        write(
            tmp.path(),
            "greeting.lua",
            "export local function greet(name) return \"hello \" .. name end\n",
        );

        let config = Config {
            minify: true,
            mangle: MangleMode::Mangle,
            define: IndexMap::new(),
        };
        let bundler = Bundler::new(config);
        let out = bundler.bundle(&tmp.path().join("main.lua")).unwrap();
        assert!(crate::parser::parse(&out).is_ok());
        assert!(!out.contains("\n\n"));
    }

    #[test]
    fn test_bundle_to_file_writes_nothing_on_error() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "main.lua",
            "import nope from \"./missing\"\nprint(nope)\n",
        );
        let output = tmp.path().join("out.lua");
        let bundler = Bundler::new(Config::default());
        assert!(bundler
            .bundle_to_file(&tmp.path().join("main.lua"), &output)
            .is_err());
        assert!(!output.exists());
    }
}
