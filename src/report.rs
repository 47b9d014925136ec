//! Human-readable dump of a node graph.
use std::fmt::Write as _;

use colored::Colorize;

use crate::graph::{NodeGraph, NodeId, NodeKind, Slot};

/// Render the graph as an indented tree, one node per line:
///
/// ```text
/// Person record
///   .name: String leaf
///   .tags: List<String> sequence
///     []: String leaf
/// ```
pub fn render(graph: &NodeGraph, styled: bool) -> String {
    let mut out = String::new();
    render_node(graph, graph.root(), styled, &mut out);
    out
}

fn render_node(graph: &NodeGraph, id: NodeId, styled: bool, out: &mut String) {
    let node = graph.node(id);
    let indent = "  ".repeat(node.depth);
    let label = match &node.slot {
        Slot::Root => String::new(),
        Slot::Field(field) => format!(".{}: ", field.name),
        Slot::Element => "[]: ".to_string(),
        Slot::Key => "<key>: ".to_string(),
        Slot::Value => "<value>: ".to_string(),
    };
    let kind = match &node.kind {
        NodeKind::Record { .. } => "record".to_string(),
        NodeKind::Array { dimensions, .. } => format!("array({dimensions})"),
        NodeKind::Sequence { unique: true, .. } => "set".to_string(),
        NodeKind::Sequence { unique: false, .. } => "sequence".to_string(),
        NodeKind::Mapping { .. } => "mapping".to_string(),
        NodeKind::Leaf(_) => "leaf".to_string(),
        NodeKind::DepthLimited(category) => format!("{category}, depth limited"),
    };
    let mut shape = node.shape.to_string();
    if let Some(declared) = &node.declared {
        let _ = write!(shape, " (declared {declared})");
    }

    if styled {
        let kind = if matches!(node.kind, NodeKind::DepthLimited(_)) {
            kind.yellow()
        } else {
            kind.dimmed()
        };
        let _ = writeln!(out, "{indent}{}{} {kind}", label.cyan(), shape.bold());
    } else {
        let _ = writeln!(out, "{indent}{label}{shape} {kind}");
    }

    for child in node.children() {
        render_node(graph, child, styled, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::settings::Settings;
    use crate::shape::{ConcreteShape, RecordSpec, ShapeRegistry};

    #[test]
    fn plain_tree() {
        let mut registry = ShapeRegistry::new();
        registry
            .define_record(RecordSpec::new("Person").field("name", "String").field("tags", "List<String>"))
            .unwrap();
        let graph = GraphBuilder::new(&registry, &Settings::default())
            .unwrap()
            .build(&ConcreteShape::named("Person"))
            .unwrap();
        let expected = "\
Person record
  .name: String leaf
  .tags: List<String> sequence
    []: String leaf
";
        assert_eq!(render(&graph, false), expected);
    }
}
