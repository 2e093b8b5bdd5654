//! Resolve `Custom("MaxPoolWithArgMax")` into the typed operator.

use tracing::{debug, trace};

use crate::error::{ForgeError, ForgeResult};
use crate::ir::{Graph, NodeId, Op, ValueRef};
use crate::pass::custom_options::MaxPoolWithArgMaxOptions;
use crate::pass::Pass;

pub const MAX_POOL_WITH_ARGMAX_CODE: &str = "MaxPoolWithArgMax";

const PASS_NAME: &str = "ResolveCustomOpMaxPoolWithArgMaxPass";

#[derive(Debug, Default, Clone, Copy)]
pub struct ResolveCustomOpMaxPoolWithArgMaxPass;

fn inconsistency(node: NodeId, reason: impl std::fmt::Display) -> ForgeError {
    ForgeError::PassInconsistency {
        pass: PASS_NAME,
        reason: format!("node {}: {}", node, reason),
    }
}

impl ResolveCustomOpMaxPoolWithArgMaxPass {
    /// Replace one matched custom node; returns the number of rewired uses.
    fn resolve(graph: &mut Graph, id: NodeId, payload: &[u8]) -> ForgeResult<usize> {
        let attrs = MaxPoolWithArgMaxOptions::decode(payload)
            .and_then(|options| options.to_attrs())
            .map_err(|reason| inconsistency(id, reason))?;

        let node = graph.node(id);
        let input = *node
            .inputs
            .first()
            .ok_or_else(|| inconsistency(id, "custom node has no input"))?;
        if node.arity() != 2 {
            return Err(inconsistency(
                id,
                format!("expected 2 outputs (values, indices), found {}", node.arity()),
            ));
        }
        let outputs = node.outputs.clone();
        if outputs[1].dtype != attrs.output_type() {
            return Err(inconsistency(
                id,
                format!(
                    "argmax output is {:?} but output_type says {:?}",
                    outputs[1].dtype,
                    attrs.output_type()
                ),
            ));
        }

        let arity = outputs.len();
        let resolved = graph.add_node(Op::MaxPoolWithArgMax(attrs), vec![input], outputs);
        let mut rewired = 0;
        for slot in 0..arity {
            rewired += graph.replace_all_uses(ValueRef::new(id, slot), ValueRef::new(resolved, slot));
        }
        trace!(from = %id, to = %resolved, rewired, "resolved MaxPoolWithArgMax");
        Ok(rewired)
    }
}

impl Pass for ResolveCustomOpMaxPoolWithArgMaxPass {
    fn name(&self) -> &'static str {
        PASS_NAME
    }

    fn run(&self, graph: &mut Graph) -> ForgeResult<bool> {
        let mut changed = false;
        for id in graph.active_nodes() {
            let payload = match &graph.node(id).op {
                Op::Custom { code, options } if code == MAX_POOL_WITH_ARGMAX_CODE => {
                    options.clone()
                }
                _ => continue,
            };
            if Self::resolve(graph, id, &payload)? > 0 {
                changed = true;
            }
        }
        debug!(changed, "{} finished", PASS_NAME);
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{DType, ValueInfo};
    use std::collections::BTreeMap;

    fn payload(output_type: i32) -> Vec<u8> {
        let map = BTreeMap::from([
            ("padding", 0),
            ("stride_w", 1),
            ("stride_h", 1),
            ("filter_width", 2),
            ("filter_height", 2),
            ("activation", 0),
            ("output_type", output_type),
        ]);
        flexbuffers::to_vec(map).unwrap()
    }

    fn custom_graph(code: &str, options: Vec<u8>) -> (Graph, NodeId) {
        let mut g = Graph::new();
        let x = g.add_input(ValueInfo::new("x", DType::Float32).with_shape(vec![1, 4, 4, 1]));
        let custom = g.add_node(
            Op::Custom {
                code: code.to_string(),
                options,
            },
            vec![ValueRef::first(x)],
            vec![
                ValueInfo::new("values", DType::Float32),
                ValueInfo::new("indices", DType::Int64),
            ],
        );
        g.mark_output(ValueRef::new(custom, 0));
        g.mark_output(ValueRef::new(custom, 1));
        (g, custom)
    }

    #[test]
    fn test_resolves_and_is_idempotent() {
        let (mut g, custom) = custom_graph(MAX_POOL_WITH_ARGMAX_CODE, payload(4));
        let pass = ResolveCustomOpMaxPoolWithArgMaxPass;

        assert!(pass.run(&mut g).unwrap());
        assert!(!g.is_active(custom));
        let resolved = g.outputs()[0].node;
        assert_eq!(g.outputs()[1], ValueRef::new(resolved, 1));
        match &g.node(resolved).op {
            Op::MaxPoolWithArgMax(attrs) => {
                assert_eq!(attrs.filter().w, 2);
                assert_eq!(attrs.output_type(), DType::Int64);
            }
            other => panic!("unexpected op {}", other),
        }
        assert!(g.validate().is_ok());

        let before = g.clone();
        assert!(!pass.run(&mut g).unwrap());
        assert_eq!(g, before);
    }

    #[test]
    fn test_other_custom_codes_untouched() {
        let (mut g, _) = custom_graph("SomethingElse", payload(4));
        let before = g.clone();
        assert!(!ResolveCustomOpMaxPoolWithArgMaxPass.run(&mut g).unwrap());
        assert_eq!(g, before);
    }

    #[test]
    fn test_index_type_disagreement_is_inconsistent() {
        let (mut g, _) = custom_graph(MAX_POOL_WITH_ARGMAX_CODE, payload(2));
        let err = ResolveCustomOpMaxPoolWithArgMaxPass.run(&mut g).unwrap_err();
        assert!(matches!(err, ForgeError::PassInconsistency { .. }));
    }
}
