//! # Tree Command Implementation
//!
//! This module implements the `tree` subcommand, which resolves the
//! composition and displays its packages in a hierarchical format.
//!
//! Resolving fetches packages into the packages cache, because nested
//! dependencies are only known once their manifests are on disk. The local
//! files and the output directory are not touched.

use std::borrow::Cow;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use ptree::{print_tree, Style, TreeItem};

use model_compose::credentials::{FileCredentialStore, TerminalPrompter};
use model_compose::defaults;
use model_compose::fetch::FetcherRegistry;
use model_compose::git::SystemGit;
use model_compose::manifest::Package;
use model_compose::output::{emoji, OutputConfig};
use model_compose::phases::orchestrator::{ComposeOptions, Composer};

/// Display the package dependency tree
#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Directory containing compose.yaml
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,

    /// Where packages are downloaded to
    #[arg(long, value_name = "DIR", env = "MODEL_COMPOSE_PACKAGES_DIR")]
    pub packages_dir: Option<PathBuf>,

    /// Prompt for credentials when a repository rejects the known ones
    #[arg(short, long, env = "MODEL_COMPOSE_INTERACTIVE")]
    pub interactive: bool,

    /// Maximum depth to display, 0 shows only direct dependencies
    #[arg(long, value_name = "NUM")]
    pub depth: Option<usize>,
}

/// Execute the `tree` command.
pub fn execute(args: TreeArgs, output: OutputConfig) -> Result<()> {
    let working_dir = super::working_dir(&args.dir)?;
    let mut options = ComposeOptions::new(&working_dir);
    if let Some(dir) = &args.packages_dir {
        options = options.with_packages_dir(dir);
    }
    options.interactive = args.interactive;

    let registry = FetcherRegistry::default();
    let mut store = FileCredentialStore::new(defaults::default_credentials_path());
    let prompter = TerminalPrompter;

    let packages = match Composer::new(options, &registry, &SystemGit, &mut store, &prompter)
        .with_cancellation(super::interrupt_token())
        .resolve()
    {
        Ok(packages) => packages,
        Err(e) if e.is_manifest_not_found() => {
            println!("{} nothing to compose", emoji(&output, "ℹ️ ", "[INFO]"));
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let root = TreeNode {
        label: format!("{} {}", emoji(&output, "🌳", "*"), working_dir.display()),
        children: build_tree(&packages, args.depth.unwrap_or(usize::MAX)),
    };
    print_tree(&root).map_err(|e| anyhow::anyhow!("Failed to display tree: {}", e))?;
    Ok(())
}

/// Top-level packages with their descendants, in declaration order.
fn build_tree(packages: &[Package], max_depth: usize) -> Vec<TreeNode> {
    let mut sorted: Vec<&Package> = packages.iter().collect();
    sorted.sort_by_key(|p| p.ordinal());

    let mut by_name: HashMap<&str, &Package> = HashMap::new();
    for package in &sorted {
        by_name.entry(package.name()).or_insert(package);
    }

    let children: Vec<&str> = sorted
        .iter()
        .flat_map(|p| p.dependencies().iter().map(String::as_str))
        .collect();

    let mut roots: Vec<&str> = sorted
        .iter()
        .map(|p| p.name())
        .filter(|name| !children.contains(name))
        .collect();
    roots.dedup();

    roots
        .into_iter()
        .filter_map(|name| node(name, &by_name, max_depth, 0))
        .collect()
}

fn node(name: &str, by_name: &HashMap<&str, &Package>, max_depth: usize, depth: usize) -> Option<TreeNode> {
    let package = by_name.get(name)?;
    let children = if depth >= max_depth {
        Vec::new()
    } else {
        package
            .dependencies()
            .iter()
            .filter_map(|child| node(child, by_name, max_depth, depth + 1))
            .collect()
    };

    Some(TreeNode {
        label: format!("{} ({})", package.name(), package.identifier()),
        children,
    })
}

/// Tree node structure for ptree visualization
#[derive(Clone, Debug)]
struct TreeNode {
    label: String,
    children: Vec<TreeNode>,
}

impl TreeItem for TreeNode {
    type Child = TreeNode;

    fn write_self<W: io::Write>(&self, f: &mut W, _style: &Style) -> io::Result<()> {
        write!(f, "{}", self.label)
    }

    fn children(&self) -> Cow<'_, [Self::Child]> {
        Cow::Borrowed(&self.children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model_compose::manifest::{Dependency, Source};

    fn package(name: &str, ordinal: usize, children: &[&str]) -> Package {
        let mut package = Package::from_dependency(
            &Dependency {
                name: name.to_string(),
                source: Source {
                    url: format!("https://example.com/org/{}.git", name),
                    ..Default::default()
                },
            },
            ordinal,
        );
        for child in children {
            package.add_dependency(child);
        }
        package
    }

    fn labels(nodes: &[TreeNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.label.as_str()).collect()
    }

    #[test]
    fn test_build_tree_nests_children() {
        // Resolution order: c, a, b
        let packages = vec![package("c", 1, &[]), package("a", 0, &["c"]), package("b", 2, &[])];
        let tree = build_tree(&packages, usize::MAX);

        assert_eq!(
            labels(&tree),
            vec!["a (example.com/org/a)", "b (example.com/org/b)"]
        );
        assert_eq!(labels(&tree[0].children), vec!["c (example.com/org/c)"]);
    }

    #[test]
    fn test_build_tree_depth_limit() {
        let packages = vec![package("c", 1, &[]), package("a", 0, &["c"])];
        let tree = build_tree(&packages, 0);
        assert_eq!(tree.len(), 1);
        assert!(tree[0].children.is_empty());
    }

    #[test]
    fn test_build_tree_empty() {
        assert!(build_tree(&[], usize::MAX).is_empty());
    }
}
