//! Diagram to DOT (Graphviz) conversion.
//!
//! Decision nodes are labelled with the packet bit they test, e.g.
//! `dst_port[4]`, and grouped by variable so that every field forms a band
//! of ranks. Solid edges are high (bit set) branches, dashed edges are low
//! branches, and dotted edges with a hollow circle are complemented.
//!
//! ```
//! use fw_equiv::bdd::Bdd;
//! use fw_equiv::bitvec::field_eq;
//! use fw_equiv::packet::{declare_packet, PacketField};
//!
//! let bdd = Bdd::default();
//! let vars = declare_packet();
//! let tcp = field_eq(&bdd, &vars, PacketField::Protocol, 6).unwrap();
//!
//! let dot = bdd.to_dot(&[("tcp", tcp)], &vars).unwrap();
//! assert!(dot.contains("proto[2]"));
//! // Render with: dot -Tpng policy.dot -o policy.png
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::bdd::Bdd;
use crate::packet::PacketVars;
use crate::reference::Ref;

#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Shape for decision nodes (default: "ellipse")
    pub node_shape: &'static str,
    /// Shape for terminal nodes (default: "square")
    pub terminal_shape: &'static str,
    /// Shape for root nodes (default: "rect")
    pub root_shape: &'static str,
    pub high_edge_style: &'static str,
    pub low_edge_style: &'static str,
    pub negated_edge_style: &'static str,
    /// Render bit indices as subscripts (default: false)
    pub use_html_labels: bool,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            node_shape: "ellipse",
            terminal_shape: "square",
            root_shape: "rect",
            high_edge_style: "solid",
            low_edge_style: "dashed",
            negated_edge_style: "dotted",
            use_html_labels: false,
        }
    }
}

impl Bdd {
    /// DOT text for the diagrams of the named `roots`; shared nodes appear once.
    pub fn to_dot(&self, roots: &[(&str, Ref)], vars: &PacketVars) -> Result<String, std::fmt::Error> {
        self.to_dot_with_config(roots, vars, &DotConfig::default())
    }

    pub fn to_dot_with_config(
        &self,
        roots: &[(&str, Ref)],
        vars: &PacketVars,
        config: &DotConfig,
    ) -> Result<String, std::fmt::Error> {
        let mut dot = String::new();
        writeln!(dot, "graph {{")?;
        writeln!(dot, "node [shape={}];", config.node_shape)?;

        writeln!(dot, "{{ rank=sink")?;
        writeln!(dot, "0 [shape={}, label=\"0\"];", config.terminal_shape)?;
        writeln!(dot, "1 [shape={}, label=\"1\"];", config.terminal_shape)?;
        writeln!(dot, "}}")?;

        let all_nodes = self.descendants(roots.iter().map(|&(_, r)| r));

        let mut levels = BTreeMap::<u32, Vec<usize>>::new();
        for &id in all_nodes.iter() {
            if id == 1 {
                continue;
            }
            let v = self.variable(Ref::positive(id as u32));
            levels.entry(v).or_default().push(id);
        }

        for (&v, ids) in levels.iter_mut() {
            ids.sort_unstable();
            let (name, bit) = match vars.field_of(v) {
                Some((field, bit)) => (field.name().to_string(), bit),
                None => ("x".to_string(), v),
            };
            let label = if config.use_html_labels {
                format!("<{}<SUB>{}</SUB>>", name, bit)
            } else {
                format!("\"{}[{}]\"", name, bit)
            };
            writeln!(dot, "{{ rank=same")?;
            for id in ids.iter() {
                writeln!(dot, "{} [label={}];", id, label)?;
            }
            writeln!(dot, "}}")?;
        }

        for ids in levels.values() {
            for &id in ids {
                let node = Ref::positive(id as u32);

                let high = self.high_node(node);
                debug_assert!(!high.is_negated());
                writeln!(dot, "{} -- {} [style={}];", id, high.index(), config.high_edge_style)?;

                let low = self.low_node(node);
                if self.is_zero(low) {
                    writeln!(dot, "{} -- 0 [style={}];", id, config.low_edge_style)?;
                } else if low.is_negated() {
                    writeln!(
                        dot,
                        "{} -- {} [style={}, dir=forward, arrowhead=odot];",
                        id,
                        low.index(),
                        config.negated_edge_style
                    )?;
                } else {
                    writeln!(dot, "{} -- {} [style={}];", id, low.index(), config.low_edge_style)?;
                }
            }
        }

        writeln!(dot, "{{ rank=source")?;
        for (i, (name, _)) in roots.iter().enumerate() {
            writeln!(dot, "r{} [shape={}, label=\"{}\"];", i, config.root_shape, name)?;
        }
        writeln!(dot, "}}")?;

        for (i, &(_, root)) in roots.iter().enumerate() {
            if self.is_zero(root) {
                writeln!(dot, "r{} -- 0;", i)?;
            } else if root.is_negated() {
                writeln!(dot, "r{} -- {} [dir=forward, arrowhead=odot];", i, root.index())?;
            } else {
                writeln!(dot, "r{} -- {};", i, root.index())?;
            }
        }

        writeln!(dot, "}}")?;
        Ok(dot)
    }
}
