//! Worklist solver for forward dataflow problems over a [`ControlFlowGraph`].

use crate::cfg::{BasicBlock, BlockId, CfgEdge, ControlFlowGraph};
use std::collections::{HashMap, VecDeque};

/// A forward dataflow problem.
///
/// Blocks that are never reached have no state; joins only ever see states
/// that actually flowed along some path from the entry block.
pub(crate) trait Analysis {
    type State: Clone + PartialEq;
    type Report;

    fn entry_state(&self, cfg: &ControlFlowGraph) -> Self::State;

    fn join(&self, a: &Self::State, b: &Self::State) -> Self::State;

    /// Apply the block's statements, pushing reports into `sink`
    fn transfer(
        &self,
        cfg: &ControlFlowGraph,
        block: &BasicBlock,
        state: &mut Self::State,
        sink: &mut Vec<Self::Report>,
    );

    /// Adjust the state flowing along `edge`; `None` marks the edge infeasible
    fn refine(&self, _block: &BasicBlock, _edge: &CfgEdge, state: Self::State) -> Option<Self::State> {
        Some(state)
    }
}

/// Block entry states at the fixed point
pub(crate) fn solve<A: Analysis>(analysis: &A, cfg: &ControlFlowGraph) -> HashMap<BlockId, A::State> {
    let mut in_states: HashMap<BlockId, A::State> = HashMap::new();
    if !cfg.blocks.contains_key(&cfg.entry_block) {
        return in_states;
    }

    in_states.insert(cfg.entry_block, analysis.entry_state(cfg));
    let mut worklist = VecDeque::from([cfg.entry_block]);
    let mut scratch = Vec::new();

    while let Some(block_id) = worklist.pop_front() {
        let (Some(block), Some(in_state)) = (cfg.blocks.get(&block_id), in_states.get(&block_id))
        else {
            continue;
        };

        let mut out = in_state.clone();
        analysis.transfer(cfg, block, &mut out, &mut scratch);
        scratch.clear();

        for edge in cfg.out_edges(block_id) {
            let Some(flowing) = analysis.refine(block, edge, out.clone()) else {
                continue;
            };
            let merged = match in_states.get(&edge.to) {
                None => flowing,
                Some(existing) => analysis.join(existing, &flowing),
            };
            if in_states.get(&edge.to) != Some(&merged) {
                in_states.insert(edge.to, merged);
                if !worklist.contains(&edge.to) {
                    worklist.push_back(edge.to);
                }
            }
        }
    }

    in_states
}

/// Re-run the transfer over every reached block at the fixed point and
/// collect the reports, in block order.
pub(crate) fn collect_reports<A: Analysis>(analysis: &A, cfg: &ControlFlowGraph) -> Vec<A::Report> {
    let in_states = solve(analysis, cfg);
    let mut reports = Vec::new();
    for block_id in cfg.sorted_block_ids() {
        let (Some(block), Some(state)) = (cfg.blocks.get(&block_id), in_states.get(&block_id)) else {
            continue;
        };
        let mut state = state.clone();
        analysis.transfer(cfg, block, &mut state, &mut reports);
    }
    reports
}

/// States at the end of each reachable exit block
pub(crate) fn exit_states<A: Analysis>(analysis: &A, cfg: &ControlFlowGraph) -> Vec<A::State> {
    let in_states = solve(analysis, cfg);
    let mut scratch = Vec::new();
    cfg.exit_blocks
        .iter()
        .filter_map(|id| {
            let block = cfg.blocks.get(id)?;
            let mut state = in_states.get(id)?.clone();
            analysis.transfer(cfg, block, &mut state, &mut scratch);
            Some(state)
        })
        .collect()
}
