//! Dependency tree rendering for `taskrun-deps-tree`.

use std::{fmt::Write, iter::Peekable, vec};

use anyhow::{Context, Result, anyhow};
use taskrun_registry::BoundInstance;

use crate::{Catalog, TaskRequest, UnitContext, executor::guard::guarded};

/// A rendered instance whose requirements are still being listed.
struct Branch {
    task_id: String,
    /// Prefix for the lines of its requirements
    prefix: String,
    requests: Peekable<vec::IntoIter<TaskRequest>>,
}

/// Renders the requirement tree below `root`, with each instance's
/// completeness. Complete instances are not expanded, as in a run.
pub fn render_tree(catalog: &Catalog, root: &BoundInstance) -> Result<String> {
    let mut out = String::new();
    let mut stack: Vec<Branch> = Vec::new();
    if let Some(requests) = render_node(catalog, root, "", &stack, &mut out)? {
        stack.push(Branch {
            task_id: root.task_id(),
            prefix: String::new(),
            requests: requests.into_iter().peekable(),
        });
    }

    while let Some(branch) = stack.last_mut() {
        let Some(request) = branch.requests.next() else {
            stack.pop();
            continue;
        };
        let last = branch.requests.peek().is_none();
        let prefix = branch.prefix.clone();
        let requirement = catalog
            .bind(&request)
            .with_context(|| format!("binding requirement {request}"))?;

        let (glyph, indent) = if last { ("└── ", "    ") } else { ("├── ", "│   ") };
        let line_prefix = format!("{prefix}{glyph}");
        if let Some(requests) = render_node(catalog, &requirement, &line_prefix, &stack, &mut out)? {
            stack.push(Branch {
                task_id: requirement.task_id(),
                prefix: format!("{prefix}{indent}"),
                requests: requests.into_iter().peekable(),
            });
        }
    }
    Ok(out)
}

/// Writes the line for `instance` and returns its requirements when it
/// needs expanding.
fn render_node(
    catalog: &Catalog,
    instance: &BoundInstance,
    prefix: &str,
    path: &[Branch],
    out: &mut String,
) -> Result<Option<Vec<TaskRequest>>> {
    let task_id = instance.task_id();
    if path.iter().any(|branch| branch.task_id == task_id) {
        let _ = writeln!(out, "{prefix}{task_id} [CYCLE]");
        return Ok(None);
    }

    let unit = catalog
        .unit(instance.definition_id())
        .ok_or_else(|| anyhow!("no work unit is registered for {task_id}"))?;
    let context = UnitContext::new(instance, catalog);
    let complete = guarded(|| unit.complete(&context))
        .with_context(|| format!("checking whether {task_id} is complete"))?;
    let _ = writeln!(
        out,
        "{prefix}{task_id} [{}]",
        if complete { "COMPLETE" } else { "PENDING" }
    );
    if complete {
        return Ok(None);
    }

    let requests = guarded(|| unit.requires(&context))
        .with_context(|| format!("listing the requirements of {task_id}"))?;
    Ok(Some(requests))
}

#[cfg(test)]
mod tests {
    use taskrun_registry::{Declaration, ParamSpec};

    use super::*;
    use crate::{TaskRequest, WorkUnit};

    struct Parent;

    impl WorkUnit for Parent {
        fn requires(&self, _context: &UnitContext<'_>) -> Result<Vec<TaskRequest>> {
            Ok(vec![TaskRequest::new("Child").with("n", 1), TaskRequest::new("Child").with("n", 2)])
        }

        fn run(&self, _context: &UnitContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    struct Child;

    impl WorkUnit for Child {
        fn complete(&self, context: &UnitContext<'_>) -> Result<bool> {
            Ok(context.instance().int("n") == Some(1))
        }

        fn run(&self, _context: &UnitContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn renders_completion_state_per_branch() {
        let mut catalog = Catalog::new();
        catalog.register_task(Declaration::task("Parent"), Parent).unwrap();
        catalog
            .register_task(Declaration::task("Child").param(ParamSpec::int("n")), Child)
            .unwrap();

        let root = catalog.bind(&TaskRequest::new("Parent")).unwrap();
        let tree = render_tree(&catalog, &root).unwrap();
        assert_eq!(
            tree,
            "Parent() [PENDING]\n├── Child(n=1) [COMPLETE]\n└── Child(n=2) [PENDING]\n"
        );
    }

    struct Broken;

    impl WorkUnit for Broken {
        fn requires(&self, _context: &UnitContext<'_>) -> Result<Vec<TaskRequest>> {
            panic!("requirements unavailable");
        }

        fn run(&self, _context: &UnitContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    struct Ladder;

    impl WorkUnit for Ladder {
        fn requires(&self, context: &UnitContext<'_>) -> Result<Vec<TaskRequest>> {
            match context.instance().int("n") {
                Some(n) if n > 0 => Ok(vec![TaskRequest::new("Ladder").with("n", n - 1)]),
                _ => Ok(Vec::new()),
            }
        }

        fn run(&self, _context: &UnitContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn nested_branches_keep_their_indentation() {
        let mut catalog = Catalog::new();
        catalog
            .register_task(Declaration::task("Ladder").param(ParamSpec::int("n")), Ladder)
            .unwrap();

        let root = catalog.bind(&TaskRequest::new("Ladder").with("n", 2)).unwrap();
        let tree = render_tree(&catalog, &root).unwrap();
        assert_eq!(
            tree,
            "Ladder(n=2) [PENDING]\n└── Ladder(n=1) [PENDING]\n    └── Ladder(n=0) [PENDING]\n"
        );
    }

    #[test]
    fn deep_chains_render_every_level() {
        let mut catalog = Catalog::new();
        catalog
            .register_task(Declaration::task("Ladder").param(ParamSpec::int("n")), Ladder)
            .unwrap();

        let root = catalog.bind(&TaskRequest::new("Ladder").with("n", 1_000)).unwrap();
        let tree = render_tree(&catalog, &root).unwrap();
        assert_eq!(tree.lines().count(), 1_001);
        assert!(tree.ends_with("└── Ladder(n=0) [PENDING]\n"));
    }

    #[test]
    fn panicking_units_become_errors() {
        let mut catalog = Catalog::new();
        catalog.register_task(Declaration::task("Broken"), Broken).unwrap();

        let root = catalog.bind(&TaskRequest::new("Broken")).unwrap();
        let error = render_tree(&catalog, &root).unwrap_err();
        assert_eq!(
            format!("{error:#}"),
            "listing the requirements of Broken(): panicked: requirements unavailable"
        );
    }
}
