//! Mixed-format regeneration.
//!
//! Re-emits the entries of a finished output graph in additional module
//! formats. Each format group is compiled again behind a [`GraphResolver`]
//! that serves module text straight from the finished graph, so original
//! sources are never re-read.

use crate::compiler::{CompileRequest, Compiler, ModuleResolver, Resolution};
use crate::errors::BundlerError;
use crate::graph::{dirname, join, ModuleFormat, OutputGraph};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Output format -> entry names emitted in that format
pub type FormatGroups = BTreeMap<ModuleFormat, BTreeSet<String>>;

/// Parse configured format groups.
///
/// Rejects unknown format names and any entry assigned to more than one
/// format. Aliases of the same format are merged.
pub fn parse_format_groups(
    raw: &BTreeMap<String, Vec<String>>,
) -> Result<FormatGroups, BundlerError> {
    let mut groups = FormatGroups::new();
    let mut assigned: BTreeMap<&str, ModuleFormat> = BTreeMap::new();

    for (format_name, entries) in raw {
        let format: ModuleFormat = format_name.parse()?;
        for entry in entries {
            if let Some(previous) = assigned.insert(entry.as_str(), format) {
                if previous != format {
                    return Err(BundlerError::Configuration(format!(
                        "Entry '{}' is assigned to both the {} and {} format groups",
                        entry, previous, format
                    )));
                }
            }
            groups.entry(format).or_default().insert(entry.clone());
        }
    }
    Ok(groups)
}

/// Resolves imports against modules already present in an output graph
pub struct GraphResolver<'a> {
    graph: &'a OutputGraph,
}

impl<'a> GraphResolver<'a> {
    pub fn new(graph: &'a OutputGraph) -> Self {
        GraphResolver { graph }
    }
}

impl ModuleResolver for GraphResolver<'_> {
    fn resolve(&self, specifier: &str, importer: Option<&str>) -> Resolution {
        match importer {
            None if self.graph.get_module(specifier).is_some() => {
                Resolution::Resolved(specifier.to_string())
            }
            None => Resolution::Unhandled,
            Some(importer) => {
                let target = join(dirname(importer), specifier);
                if self.graph.get_module(&target).is_some() {
                    Resolution::Resolved(target)
                } else {
                    Resolution::External
                }
            }
        }
    }

    fn load(&self, id: &str) -> Option<String> {
        self.graph.get_module(id).map(|module| module.code.clone())
    }
}

/// Re-emit every entry of `graph` according to `groups`.
///
/// Entries not named in any group are re-emitted in `default_format`. All
/// modules of the input graph are replaced by the regenerated ones; assets
/// are kept as they are.
pub fn regenerate(
    compiler: &dyn Compiler,
    graph: OutputGraph,
    groups: &FormatGroups,
    default_format: ModuleFormat,
) -> Result<OutputGraph, BundlerError> {
    let entries: BTreeMap<String, String> = graph
        .entries()
        .map(|module| (module.name.clone(), module.file_name.clone()))
        .collect();

    let mut assigned: BTreeSet<&str> = BTreeSet::new();
    for names in groups.values() {
        for name in names {
            if !entries.contains_key(name) {
                return Err(BundlerError::EntryNotFound(name.clone()));
            }
            assigned.insert(name);
        }
    }

    let mut plan = groups.clone();
    let unassigned: BTreeSet<String> = entries
        .keys()
        .filter(|name| !assigned.contains(name.as_str()))
        .cloned()
        .collect();
    if !unassigned.is_empty() {
        plan.entry(default_format).or_default().extend(unassigned);
    }

    let requests: Vec<CompileRequest> = plan
        .iter()
        .filter(|(_, names)| !names.is_empty())
        .map(|(format, names)| CompileRequest {
            entries: names
                .iter()
                .filter_map(|name| entries.get(name).map(|file| (name.clone(), file.clone())))
                .collect(),
            format: *format,
        })
        .collect();

    let resolver = GraphResolver::new(&graph);
    let regenerated: Vec<OutputGraph> = requests
        .par_iter()
        .map(|request| {
            debug!(
                "Regenerating {} entr(ies) as {}",
                request.entries.len(),
                request.format
            );
            compiler.compile(request, Some(&resolver))
        })
        .collect::<Result<_, _>>()?;

    let mut output = graph;
    let removed = output.take_modules().len();
    for subgraph in regenerated {
        for item in subgraph.items() {
            output.insert(item.clone())?;
        }
    }

    info!(
        "Regenerated {} format group(s): replaced {} module(s) with {}",
        requests.len(),
        removed,
        output.module_count()
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Module;
    use crate::passthrough::PassthroughCompiler;
    use std::fs;
    use tempfile::TempDir;

    fn raw(groups: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        groups
            .iter()
            .map(|(format, names)| {
                (
                    (*format).to_string(),
                    names.iter().map(|n| (*n).to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_duplicate_assignment_is_rejected() {
        let groups = raw(&[("iife", &["content"]), ("esm", &["background", "content"])]);
        assert!(matches!(
            parse_format_groups(&groups),
            Err(BundlerError::Configuration(_))
        ));
    }

    #[test]
    fn test_aliases_merge_into_one_group() {
        let groups = raw(&[("es", &["a"]), ("esm", &["b"])]);
        let parsed = parse_format_groups(&groups).unwrap_or_default();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.get(&ModuleFormat::Esm).map(BTreeSet::len), Some(2));
    }

    #[test]
    fn test_graph_resolver() {
        let mut graph = OutputGraph::new();
        let _ = graph.insert_module(Module {
            file_name: "chunks/a.js".to_string(),
            name: "a".to_string(),
            code: "export const a = 1;".to_string(),
            imports: Vec::new(),
            dynamic_imports: Vec::new(),
            is_entry: false,
            format: ModuleFormat::Esm,
        });
        let resolver = GraphResolver::new(&graph);

        assert_eq!(
            resolver.resolve("./a.js", Some("chunks/b.js")),
            Resolution::Resolved("chunks/a.js".to_string())
        );
        assert_eq!(
            resolver.resolve("../chunks/a.js", Some("content.js")),
            Resolution::Resolved("chunks/a.js".to_string())
        );
        assert_eq!(
            resolver.resolve("lodash", Some("content.js")),
            Resolution::External
        );
        assert_eq!(resolver.resolve("missing.js", None), Resolution::Unhandled);
        assert_eq!(resolver.load("chunks/a.js").as_deref(), Some("export const a = 1;"));
    }

    #[test]
    fn test_regenerate_mixed_formats() {
        let Ok(temp_dir) = TempDir::new() else {
            return;
        };
        let root = temp_dir.path();
        let p = root.join("p.js");
        let q = root.join("q.js");
        assert!(fs::write(&p, "console.log('p');\n").is_ok());
        assert!(fs::write(&q, "import { s } from './shared.js';\nconsole.log(s);\n").is_ok());
        assert!(fs::write(root.join("shared.js"), "export const s = 1;\n").is_ok());
        assert!(fs::write(root.join("style.css"), "body {}").is_ok());

        let compiler = PassthroughCompiler::new();
        let request = CompileRequest::new(ModuleFormat::Esm)
            .with_entry("p", p.to_string_lossy())
            .with_entry("q", q.to_string_lossy());
        let Ok(mut graph) = compiler.compile(&request, None) else {
            panic!("compile failed");
        };
        assert!(graph
            .emit_asset("style.css", Some("style.css"), b"body {}".to_vec())
            .is_ok());
        let original_chunks: Vec<String> = graph
            .modules()
            .filter(|m| !m.is_entry)
            .map(|m| m.file_name.clone())
            .collect();

        let groups = parse_format_groups(&raw(&[("iife", &["p"])])).unwrap_or_default();
        let Ok(output) = regenerate(&compiler, graph, &groups, ModuleFormat::Esm) else {
            panic!("regenerate failed");
        };

        let p_modules: Vec<&Module> = output.modules().filter(|m| m.name == "p").collect();
        let q_modules: Vec<&Module> = output.modules().filter(|m| m.name == "q").collect();
        assert_eq!(p_modules.len(), 1);
        assert_eq!(q_modules.len(), 1);
        assert_eq!(p_modules[0].format, ModuleFormat::Iife);
        assert_eq!(q_modules[0].format, ModuleFormat::Esm);
        assert_eq!(output.module_count(), 3);

        for chunk in &original_chunks {
            assert!(output.get(chunk).is_none(), "leftover module {chunk}");
        }
        assert!(output.get("style.css").is_some());
    }

    #[test]
    fn test_unknown_group_entry_fails_before_compiling() {
        let graph = OutputGraph::new();
        let groups = parse_format_groups(&raw(&[("iife", &["ghost"])])).unwrap_or_default();
        let result = regenerate(&PassthroughCompiler::new(), graph, &groups, ModuleFormat::Esm);
        assert!(matches!(result, Err(BundlerError::EntryNotFound(_))));
    }
}
