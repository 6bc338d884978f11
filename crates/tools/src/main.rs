use std::env;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use catalog::{InMemoryCatalogStore, load_hierarchy, parse_records};
use hydration::lookup::{RenderingParamsLookup, UnavailableLookup};
use hydration::pipeline::HydrationOutcome;
use layers::hierarchy::{DEFAULT_ROOT_NAME, Hierarchy};
use layers::layer::NodeHandle;
use layers::walker::{flatten, key_of};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tree_view::{CheckEvent, LayerTree, LayerTreeOptions, MapSurface, NoopDispatch};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = real_main() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[derive(Debug, PartialEq)]
enum Command {
    Tree {
        records: PathBuf,
        catalog: Option<PathBuf>,
    },
    Flatten {
        records: PathBuf,
    },
    Toggle {
        records: PathBuf,
        key: String,
        visible: bool,
    },
}

fn real_main() -> Result<(), String> {
    let args: Vec<String> = env::args().skip(1).collect();
    let options = options_from_env();
    match parse_args(&args)? {
        Command::Tree { records, catalog } => cmd_tree(records, catalog, options),
        Command::Flatten { records } => cmd_flatten(records, options),
        Command::Toggle {
            records,
            key,
            visible,
        } => cmd_toggle(records, key, visible, options),
    }
}

fn parse_args(args: &[String]) -> Result<Command, String> {
    let Some((cmd, rest)) = args.split_first() else {
        return Err(usage());
    };

    match cmd.as_str() {
        "tree" => {
            // layer-tree tree <records.json> [--catalog FILE]
            let mut records: Option<PathBuf> = None;
            let mut catalog: Option<PathBuf> = None;
            let mut i = 0;
            while i < rest.len() {
                match rest[i].as_str() {
                    "--catalog" => {
                        i += 1;
                        if i >= rest.len() {
                            return Err("--catalog requires a value".to_string());
                        }
                        catalog = Some(PathBuf::from(&rest[i]));
                    }
                    s if s.starts_with('-') => {
                        return Err(format!("unknown arg: {s}\n\n{}", usage()));
                    }
                    s if records.is_none() => records = Some(PathBuf::from(s)),
                    s => return Err(format!("unexpected arg: {s}\n\n{}", usage())),
                }
                i += 1;
            }
            let records = records.ok_or_else(usage)?;
            Ok(Command::Tree { records, catalog })
        }
        "flatten" => match rest {
            [records] => Ok(Command::Flatten {
                records: PathBuf::from(records),
            }),
            _ => Err(usage()),
        },
        "toggle" => match rest {
            [records, key, state] => Ok(Command::Toggle {
                records: PathBuf::from(records),
                key: key.clone(),
                visible: parse_switch(state)?,
            }),
            _ => Err(usage()),
        },
        _ => Err(usage()),
    }
}

fn parse_switch(value: &str) -> Result<bool, String> {
    match value {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        other => Err(format!("expected on|off, got {other}")),
    }
}

fn options_from_env() -> LayerTreeOptions {
    LayerTreeOptions {
        async_tree: env::var("LAYER_TREE_ASYNC")
            .ok()
            .and_then(|v| parse_switch(&v).ok())
            .unwrap_or(false),
        root_name: env::var("LAYER_TREE_ROOT_NAME")
            .unwrap_or_else(|_| DEFAULT_ROOT_NAME.to_string()),
    }
}

fn load(records: &PathBuf, options: &LayerTreeOptions) -> Result<Hierarchy, String> {
    let raw = fs::read_to_string(records).map_err(|e| format!("read {records:?}: {e}"))?;
    let parsed = parse_records(&raw).map_err(|e| format!("parse {records:?}: {e}"))?;
    Ok(load_hierarchy(&parsed, &options.root_name))
}

fn cmd_tree(
    records: PathBuf,
    catalog: Option<PathBuf>,
    options: LayerTreeOptions,
) -> Result<(), String> {
    let hierarchy = load(&records, &options)?;
    let lookup: Arc<dyn RenderingParamsLookup> = match &catalog {
        Some(path) => {
            let raw = fs::read_to_string(path).map_err(|e| format!("read {path:?}: {e}"))?;
            Arc::new(InMemoryCatalogStore::from_json(&raw).map_err(|e| format!("catalog: {e}"))?)
        }
        None => Arc::new(UnavailableLookup),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .map_err(|e| format!("runtime: {e}"))?;

    let mut surface = MapSurface::new();
    let mut tree = LayerTree::mount(&mut surface, Some(hierarchy), options, NoopDispatch, lookup);
    if catalog.is_some() {
        let outcomes = runtime.block_on(tree.hydrate_all());
        let failed = outcomes
            .iter()
            .filter(|o| matches!(o, HydrationOutcome::Failed { .. }))
            .count();
        info!(fetched = outcomes.len(), failed, "hydration finished");
    }

    let payload =
        serde_json::to_string_pretty(tree.tree_data()).map_err(|e| format!("json: {e}"))?;
    println!("{payload}");
    tree.unmount();
    Ok(())
}

fn cmd_flatten(records: PathBuf, options: LayerTreeOptions) -> Result<(), String> {
    let hierarchy = load(&records, &options)?;
    let mut out = std::io::stdout().lock();
    for handle in flatten(&hierarchy, hierarchy.root()) {
        let Some(line) = flatten_line(&hierarchy, handle) else {
            continue;
        };
        writeln!(out, "{line}").map_err(|e| format!("write: {e}"))?;
    }
    Ok(())
}

/// One indented line per entity; leaves also list their rendering layer and
/// GetMap parameters.
fn flatten_line(hierarchy: &Hierarchy, handle: NodeHandle) -> Option<String> {
    let entity = hierarchy.entity(handle)?;
    let mut depth = 0;
    let mut cursor = hierarchy.parent(handle);
    while let Some(parent) = cursor {
        depth += 1;
        cursor = hierarchy.parent(parent);
    }
    let key = key_of(hierarchy, handle).unwrap_or_default();
    let mut line = format!("{}{key}", "  ".repeat(depth));
    match entity.as_leaf() {
        None => line.push_str(&format!(" [group] {}", entity.title)),
        Some(leaf) => {
            line.push_str(&format!(" [leaf] {}", entity.title));
            if let Some(rendering_layer) = &leaf.rendering_layer {
                line.push_str(&format!(" <- {rendering_layer}"));
            }
            for (name, value) in leaf.source.wms_params() {
                line.push_str(&format!(" {name}={value}"));
            }
        }
    }
    Some(line)
}

#[derive(Serialize)]
struct VisibilityLine {
    key: String,
    title: String,
    visible: bool,
}

fn cmd_toggle(
    records: PathBuf,
    key: String,
    visible: bool,
    options: LayerTreeOptions,
) -> Result<(), String> {
    let hierarchy = load(&records, &options)?;
    let mut surface = MapSurface::new();
    let mut tree = LayerTree::mount(
        &mut surface,
        Some(hierarchy),
        options,
        NoopDispatch,
        Arc::new(UnavailableLookup),
    );
    if !tree.on_check(&CheckEvent::new(key.clone(), visible)) {
        return Err(format!("no tree node with key {key}"));
    }

    let h = tree.hierarchy();
    let lines: Vec<VisibilityLine> = flatten(h, h.root())
        .into_iter()
        .filter(|n| *n != h.root())
        .filter_map(|n| {
            let entity = h.entity(n)?;
            Some(VisibilityLine {
                key: key_of(h, n)?,
                title: entity.title.clone(),
                visible: entity.visible,
            })
        })
        .collect();
    let payload = serde_json::to_string_pretty(&lines).map_err(|e| format!("json: {e}"))?;
    println!("{payload}");
    Ok(())
}

fn usage() -> String {
    let exe = env::args()
        .next()
        .unwrap_or_else(|| "layer-tree".to_string());
    format!(
        "Usage:\n  {exe} tree <records.json> [--catalog <rendering_layers.json>]\n  {exe} flatten <records.json>\n  {exe} toggle <records.json> <key> <on|off>\n\nEnvironment:\n- LAYER_TREE_ROOT_NAME: name of the root group (default `{DEFAULT_ROOT_NAME}`).\n- LAYER_TREE_ASYNC: wait for dispatch callbacks before applying node edits.\n- RUST_LOG: log filter, e.g. `RUST_LOG=debug`.\n"
    )
}

#[cfg(test)]
mod tests {
    use super::{Command, flatten_line, parse_args, parse_switch};
    use layers::hierarchy::Hierarchy;
    use layers::layer::{LayerAttributes, LayerEntity};
    use std::path::PathBuf;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_tree_with_and_without_catalog() {
        assert_eq!(
            parse_args(&args(&["tree", "ctx.json"])),
            Ok(Command::Tree {
                records: PathBuf::from("ctx.json"),
                catalog: None,
            })
        );
        assert_eq!(
            parse_args(&args(&["tree", "--catalog", "layers.json", "ctx.json"])),
            Ok(Command::Tree {
                records: PathBuf::from("ctx.json"),
                catalog: Some(PathBuf::from("layers.json")),
            })
        );
        assert!(parse_args(&args(&["tree", "ctx.json", "--catalog"])).is_err());
        assert!(parse_args(&args(&["tree", "a.json", "b.json"])).is_err());
        assert!(parse_args(&args(&["tree", "--verbose", "a.json"])).is_err());
    }

    #[test]
    fn parses_flatten_and_toggle() {
        assert_eq!(
            parse_args(&args(&["flatten", "ctx.json"])),
            Ok(Command::Flatten {
                records: PathBuf::from("ctx.json"),
            })
        );
        assert_eq!(
            parse_args(&args(&["toggle", "ctx.json", "12", "off"])),
            Ok(Command::Toggle {
                records: PathBuf::from("ctx.json"),
                key: "12".to_string(),
                visible: false,
            })
        );
        assert!(parse_args(&args(&["toggle", "ctx.json", "12", "maybe"])).is_err());
        assert!(parse_args(&args(&["toggle", "ctx.json"])).is_err());
    }

    #[test]
    fn rejects_unknown_or_missing_commands() {
        assert!(parse_args(&[]).is_err());
        assert!(parse_args(&args(&["pack"])).is_err());
    }

    #[test]
    fn flatten_lines_indent_and_describe_leaves() {
        let mut h = Hierarchy::new("root");
        let group = h.insert(h.root(), LayerEntity::group("Transport").with_id(11));
        let leaf = h.insert(
            group,
            LayerAttributes::new("Roads").with_rendering_layer(55).to_entity().with_id(12),
        );

        assert_eq!(flatten_line(&h, group).as_deref(), Some("  11 [group] Transport"));
        assert_eq!(
            flatten_line(&h, leaf).as_deref(),
            Some("    12 [leaf] Roads <- 55 VERSION=1.3.0 FORMAT=image/png TRANSPARENT=true")
        );
    }

    #[test]
    fn switch_spellings() {
        assert_eq!(parse_switch("on"), Ok(true));
        assert_eq!(parse_switch("0"), Ok(false));
        assert!(parse_switch("yes").is_err());
    }
}
