// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph traversal.
//!
//! Each node kind is processed as an async body over a shared [`Runtime`].
//! A chain (node, output selection, next node, ...) runs as a loop so long
//! narratives do not nest futures. Graph and group nodes run their inner
//! chains inline on the same layer; layer nodes fan out one branch per
//! selected layer definition and join them.
//!
//! Every node pushes a [`ProcessingFrame`] on its layer's stack and keeps
//! its phase current, so a restored sequencer can pick up mid-node.
//!
//! `RefCell` borrows are never held across an `.await`.

use crate::config::SequencerConfig;
use crate::error::{Result, SequencerError};
use crate::layer::LayerId;
use crate::media::MediaProbe;
use crate::strategy::{SelectionContext, StrategyRegistry};
use crate::task::{wait_until, yield_now};
use crate::timeline::{ProcessingFrame, ProcessingPhase, Timeline};
use futures::future::{join_all, LocalBoxFuture};
use futures::FutureExt;
use ordoplay_narrative_graph::{
    Candidate, DecisionRef, DecisionState, LayerDefinitionId, LayerType, NarrativeObjectId,
    NarrativeObjectKind, NarrativeSpace, SelectionRecord,
};
use rand::rngs::StdRng;
use std::cell::RefCell;
use std::rc::Rc;

/// Shared handles every traversal task holds
#[derive(Clone)]
pub(crate) struct Runtime {
    pub(crate) space: Rc<RefCell<NarrativeSpace>>,
    pub(crate) timeline: Rc<RefCell<Timeline>>,
    pub(crate) strategies: Rc<StrategyRegistry>,
    pub(crate) config: Rc<SequencerConfig>,
    pub(crate) rng: Rc<RefCell<StdRng>>,
    pub(crate) probe: Option<Rc<dyn MediaProbe>>,
}

impl Runtime {
    fn node_name(&self, node: NarrativeObjectId) -> String {
        self.space
            .borrow()
            .node(node)
            .map(|n| n.name.clone())
            .unwrap_or_default()
    }

    /// Called as processing of a node begins. Returns the frame depth.
    fn on_start_processing(&self, node: NarrativeObjectId, layer: LayerId) -> usize {
        tracing::trace!(node = %node, layer = %layer, "Processing narrative object");
        self.timeline.borrow_mut().push_frame(layer, node)
    }

    fn set_phase(&self, layer: LayerId, depth: usize, phase: ProcessingPhase) {
        self.timeline.borrow_mut().set_phase(layer, depth, phase);
    }

    fn leave(&self, layer: LayerId, depth: usize) {
        self.timeline.borrow_mut().pop_frames(layer, depth);
    }

    /// A non-master layer past its finished master's end schedules nothing
    /// more; every enclosing chain and group loop on it winds down.
    fn layer_exhausted(&self, layer: LayerId) -> bool {
        self.timeline.borrow().reached_master_end(layer)
    }
}

/// What a node body tells the chain
enum Flow {
    /// Go on to output selection
    Continue,
    /// End the chain here
    Stop,
}

/// Process `start` and the chain of output selections after it
pub(crate) fn process_chain(
    rt: Runtime,
    start: NarrativeObjectId,
    layer: LayerId,
) -> LocalBoxFuture<'static, Result<()>> {
    async move {
        let mut current = Some(start);
        while let Some(node) = current {
            if rt.layer_exhausted(layer) {
                tracing::debug!(node = %node, layer = %layer, "Layer reached its master's end");
                break;
            }
            let depth = rt.on_start_processing(node, layer);
            let next = process_node_from(&rt, node, layer, depth, ProcessingPhase::Body).await;
            rt.leave(layer, depth);
            current = next?;
        }
        Ok(())
    }
    .boxed_local()
}

/// Run a node from `phase` to the end of its output selection.
/// Returns the next node of the chain.
async fn process_node_from(
    rt: &Runtime,
    node: NarrativeObjectId,
    layer: LayerId,
    depth: usize,
    phase: ProcessingPhase,
) -> Result<Option<NarrativeObjectId>> {
    let (name, kind) = {
        let space = rt.space.borrow();
        let object = space.node(node).ok_or(SequencerError::NodeNotFound(node))?;
        (object.name.clone(), object.kind.clone())
    };

    let flow = match phase {
        ProcessingPhase::Body => match kind {
            NarrativeObjectKind::Atomic(_) => process_atomic(rt, node, layer, depth).await?,
            NarrativeObjectKind::Graph { root } => {
                let root = root.ok_or(SequencerError::MissingRoot { node, name })?;
                rt.set_phase(layer, depth, ProcessingPhase::AwaitingSubgraph);
                process_chain(rt.clone(), root, layer).await?;
                Flow::Continue
            }
            NarrativeObjectKind::Group(_) => {
                process_group(rt, node, layer, depth, None).await?;
                Flow::Continue
            }
            NarrativeObjectKind::Layer(_) => {
                process_layer(rt, node, layer, depth).await?;
                Flow::Continue
            }
        },
        ProcessingPhase::AwaitingSubgraph | ProcessingPhase::OutputSelection => Flow::Continue,
        ProcessingPhase::GroupSelection { selections, pending } => {
            process_group(rt, node, layer, depth, Some((selections, pending))).await?;
            Flow::Continue
        }
        ProcessingPhase::AwaitingLayers { layers } => {
            finish_layers(rt, &layers).await;
            Flow::Continue
        }
    };

    match flow {
        Flow::Stop => Ok(None),
        Flow::Continue if rt.layer_exhausted(layer) => Ok(None),
        Flow::Continue => {
            rt.set_phase(layer, depth, ProcessingPhase::OutputSelection);
            let picks = run_decision::<NarrativeObjectId>(rt, DecisionRef::Output(node), layer).await?;
            Ok(picks.first().copied())
        }
    }
}

/// Schedule an atomic node's cue once the layer is within look-ahead
async fn process_atomic(
    rt: &Runtime,
    node: NarrativeObjectId,
    layer: LayerId,
    depth: usize,
) -> Result<Flow> {
    let (name, atomic) = {
        let space = rt.space.borrow();
        let object = space.node(node).ok_or(SequencerError::NodeNotFound(node))?;
        (object.name.clone(), object.atomic_media().cloned())
    };
    let Some(atomic) = atomic else {
        return Ok(Flow::Continue);
    };
    let media = atomic
        .media
        .ok_or_else(|| SequencerError::InvalidMedia { node, name: name.clone() })?;

    let duration = if atomic.use_media_duration {
        match rt.probe.as_ref().and_then(|probe| probe.duration(&media)) {
            Some(duration) => duration,
            None => {
                tracing::warn!(node = %node, media = %media.uri, "Could not read media duration");
                0.0
            }
        }
    } else {
        atomic.duration
    };
    if duration.is_nan() || duration <= 0.0 {
        return Err(SequencerError::InvalidDuration { node, name, duration });
    }

    rt.timeline.borrow_mut().mark_sequenced(node);

    let lookahead = rt.config.lookahead_seconds;
    loop {
        let (ready, exhausted) = {
            let timeline = rt.timeline.borrow();
            (timeline.can_sequence(layer, lookahead), timeline.reached_master_end(layer))
        };
        if exhausted {
            return Ok(Flow::Stop);
        }
        if ready {
            break;
        }
        yield_now().await;
    }

    rt.timeline
        .borrow_mut()
        .schedule_cue(layer, node, media, atomic.in_time, duration)?;
    rt.set_phase(layer, depth, ProcessingPhase::OutputSelection);
    Ok(Flow::Continue)
}

/// Group selection loop: check termination, select once, process picks.
/// `resume` carries the selections and unprocessed picks of a restored loop.
async fn process_group(
    rt: &Runtime,
    node: NarrativeObjectId,
    layer: LayerId,
    depth: usize,
    resume: Option<(SelectionRecord<NarrativeObjectId>, Vec<NarrativeObjectId>)>,
) -> Result<()> {
    let at = DecisionRef::Group(node);
    let (termination, decision_name) = {
        let space = rt.space.borrow();
        let group = space
            .node(node)
            .and_then(|n| n.group_selection())
            .ok_or(SequencerError::NodeNotFound(node))?;
        (group.termination.clone(), group.selection.name.clone())
    };
    let terminator = rt.strategies.termination(&termination.name).ok_or_else(|| {
        SequencerError::UnknownStrategy {
            decision: decision_name,
            strategy: termination.name.clone(),
        }
    })?;

    let mut pending = {
        let mut space = rt.space.borrow_mut();
        let decision = NarrativeObjectId::decision_point_mut(&mut space, at)
            .ok_or(SequencerError::NodeNotFound(node))?;
        match resume {
            Some((selections, pending)) => {
                decision.restore_selections(selections);
                pending
            }
            None => {
                decision.clear_history();
                Vec::new()
            }
        }
    };

    loop {
        while !pending.is_empty() {
            if rt.layer_exhausted(layer) {
                break;
            }
            let child = pending.remove(0);
            let selections = {
                let space = rt.space.borrow();
                NarrativeObjectId::decision_point(&space, at)
                    .map(|d| d.selections().clone())
                    .unwrap_or_default()
            };
            rt.set_phase(
                layer,
                depth,
                ProcessingPhase::GroupSelection {
                    selections,
                    pending: pending.clone(),
                },
            );
            process_chain(rt.clone(), child, layer).await?;
        }

        if rt.layer_exhausted(layer) {
            tracing::debug!(node = %node, layer = %layer, "Group stopped at its master's end");
            break;
        }
        let ctx = SelectionContext::new(rt.clone(), at, layer, termination.clone());
        if terminator.should_terminate(&ctx) {
            break;
        }

        // No progress ends the loop whatever the termination strategy says
        let picks = run_decision::<NarrativeObjectId>(rt, at, layer).await?;
        if picks.is_empty() {
            break;
        }
        pending = picks;
    }

    set_decision_state::<NarrativeObjectId>(rt, at, DecisionState::Terminated);
    Ok(())
}

/// Select layer definitions, run them side by side and trim to the master
async fn process_layer(
    rt: &Runtime,
    node: NarrativeObjectId,
    layer: LayerId,
    depth: usize,
) -> Result<()> {
    let picks = run_decision::<LayerDefinitionId>(rt, DecisionRef::Layer(node), layer).await?;
    if picks.is_empty() {
        return Ok(());
    }

    let definitions: Vec<(LayerDefinitionId, LayerType, f64)> = {
        let space = rt.space.borrow();
        picks
            .iter()
            .map(|id| {
                space
                    .layer_definition(*id)
                    .map(|d| (d.id, d.layer_type, d.start_offset))
                    .ok_or(SequencerError::LayerDefinitionNotFound(*id))
            })
            .collect::<Result<_>>()?
    };
    let masters = definitions
        .iter()
        .filter(|(_, layer_type, _)| *layer_type == LayerType::Master)
        .count();
    if masters > 1 {
        return Err(SequencerError::MultipleMasterLayers {
            node,
            name: rt.node_name(node),
        });
    }

    let children = rt.timeline.borrow_mut().start_layers(layer, &definitions)?;
    tracing::info!(node = %node, layers = children.len(), "Starting layers");
    rt.set_phase(
        layer,
        depth,
        ProcessingPhase::AwaitingLayers {
            layers: children.clone(),
        },
    );

    let branches = children
        .iter()
        .zip(&definitions)
        .map(|(child, (definition, _, _))| run_layer_branch(rt.clone(), *child, *definition));
    join_all(branches).await;

    finish_layers(rt, &children).await;
    Ok(())
}

/// Wait for a cohort of layers to finish traversal, then trim to the master
async fn finish_layers(rt: &Runtime, layers: &[LayerId]) {
    wait_until(|| {
        let timeline = rt.timeline.borrow();
        !layers
            .iter()
            .filter_map(|id| timeline.layer(*id))
            .any(|l| !l.is_traversal_complete())
    })
    .await;
    rt.timeline.borrow_mut().trim_to_master(layers);
}

/// One child layer's traversal. Errors end this branch only.
fn run_layer_branch(
    rt: Runtime,
    layer: LayerId,
    definition: LayerDefinitionId,
) -> LocalBoxFuture<'static, ()> {
    async move {
        let result = process_layer_definition(&rt, layer, definition).await;
        finish_branch(&rt, layer, result);
    }
    .boxed_local()
}

fn finish_branch(rt: &Runtime, layer: LayerId, result: Result<()>) {
    let mut timeline = rt.timeline.borrow_mut();
    if let Err(error) = result {
        timeline.record_failure(layer, error);
    }
    timeline.complete_layer(layer);
}

/// Wait for the definition's trigger, if any, then run its root chain
async fn process_layer_definition(
    rt: &Runtime,
    layer: LayerId,
    definition: LayerDefinitionId,
) -> Result<()> {
    let (name, root, trigger) = {
        let space = rt.space.borrow();
        let def = space
            .layer_definition(definition)
            .ok_or(SequencerError::LayerDefinitionNotFound(definition))?;
        (def.name.clone(), def.root, def.trigger.clone())
    };
    let root = root.ok_or(SequencerError::MissingLayerRoot { definition, name })?;

    if let Some(trigger) = trigger {
        tracing::debug!(layer = %layer, event = %trigger.event, "Layer waiting for trigger");
        let fired_at = loop {
            let time = rt.timeline.borrow().trigger_time(&trigger.event);
            if let Some(time) = time {
                break time;
            }
            yield_now().await;
        };
        rt.timeline.borrow_mut().set_layer_start(layer, fired_at)?;
    }

    process_chain(rt.clone(), root, layer).await
}

/// Resolve one decision point with its strategy and record the picks
async fn run_decision<C: Candidate>(rt: &Runtime, at: DecisionRef, layer: LayerId) -> Result<Vec<C>> {
    let (name, strategy, empty) = {
        let space = rt.space.borrow();
        let decision = C::decision_point(&space, at).ok_or(SequencerError::NodeNotFound(at.node()))?;
        (
            decision.name.clone(),
            decision.strategy.clone(),
            decision.candidates().is_empty(),
        )
    };
    if empty {
        tracing::debug!(decision = %name, node = %at.node(), "Decision point has no candidates");
        set_decision_state::<C>(rt, at, DecisionState::Terminated);
        return Ok(Vec::new());
    }

    let selector = rt
        .strategies
        .selection(&strategy.name)
        .ok_or_else(|| SequencerError::UnknownStrategy {
            decision: name.clone(),
            strategy: strategy.name.clone(),
        })?;

    set_decision_state::<C>(rt, at, DecisionState::Selecting);
    let positions = selector
        .select(SelectionContext::new(rt.clone(), at, layer, strategy))
        .await?;
    yield_now().await;

    let picks: Vec<C> = {
        let mut space = rt.space.borrow_mut();
        let decision =
            C::decision_point_mut(&mut space, at).ok_or(SequencerError::NodeNotFound(at.node()))?;
        let picks: Vec<C> = positions
            .into_iter()
            .filter_map(|position| decision.candidate(position))
            .collect();
        for pick in &picks {
            decision.record_selection(*pick);
        }
        decision.set_state(if picks.is_empty() {
            DecisionState::Terminated
        } else {
            DecisionState::Selected
        });
        picks
    };

    if picks.is_empty() {
        tracing::warn!(decision = %name, node = %at.node(), "No {} made", at.label());
    }
    Ok(picks)
}

fn set_decision_state<C: Candidate>(rt: &Runtime, at: DecisionRef, state: DecisionState) {
    if let Some(decision) = C::decision_point_mut(&mut rt.space.borrow_mut(), at) {
        decision.set_state(state);
    }
}

/// Start traversal at the narrative root on the base layer
pub(crate) fn run_root(rt: Runtime, root: NarrativeObjectId) -> LocalBoxFuture<'static, ()> {
    async move {
        let base = rt.timeline.borrow().base_layer();
        let result = process_chain(rt.clone(), root, base).await;
        finish_branch(&rt, base, result);
        tracing::info!("Narrative traversal complete");
    }
    .boxed_local()
}

/// Resume every unfinished layer from its saved processing stack
pub(crate) fn resume(rt: Runtime) -> LocalBoxFuture<'static, ()> {
    async move {
        let plans: Vec<(LayerId, Vec<ProcessingFrame>, Option<LayerDefinitionId>)> = {
            let timeline = rt.timeline.borrow();
            timeline
                .layers()
                .filter(|layer| !layer.is_traversal_complete())
                .map(|layer| (layer.id, timeline.frames(layer.id).to_vec(), layer.definition))
                .collect()
        };
        tracing::info!(layers = plans.len(), "Resuming traversal");

        let branches = plans.into_iter().map(|(layer, frames, definition)| {
            let rt = rt.clone();
            async move {
                let result = if !frames.is_empty() {
                    resume_frames(&rt, layer, frames).await
                } else if let Some(definition) = definition {
                    process_layer_definition(&rt, layer, definition).await
                } else {
                    Ok(())
                };
                finish_branch(&rt, layer, result);
            }
            .boxed_local()
        });
        join_all(branches).await;
        tracing::info!("Narrative traversal complete");
    }
    .boxed_local()
}

/// Finish each saved frame, innermost first, then continue its chain
async fn resume_frames(rt: &Runtime, layer: LayerId, frames: Vec<ProcessingFrame>) -> Result<()> {
    for (depth, frame) in frames.into_iter().enumerate().rev() {
        let next = process_node_from(rt, frame.node, layer, depth, frame.phase).await;
        rt.leave(layer, depth);
        if let Some(next) = next? {
            process_chain(rt.clone(), next, layer).await?;
        }
    }
    Ok(())
}
