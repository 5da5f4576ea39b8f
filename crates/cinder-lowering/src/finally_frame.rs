//! The tree of try-with-yield scopes.
//!
//! Frames live in an arena and refer to each other by `FrameId`. The root
//! frame stands for "outside every try-with-yield": it has no parent and no
//! handler, and its finalize state is `NOT_STARTED_OR_RUNNING`.
//!
//! ## Known states
//!
//! When a frame registers a state, the state is recorded in the parent and
//! in every further ancestor, each time mapped to the ancestor's *immediate
//! child* on the path down. A frame's `known_states` therefore lists the
//! states owned by its strict descendants; the root sees every state owned
//! by a non-root frame. `Dispose` turns these maps into nested switches.
//!
//! A new frame registers its own finalize state this way as soon as it is
//! pushed, so a failure while running inside the frame (state == finalize
//! state) also dispatches to it.
//!
//! ## Proxy labels
//!
//! A `goto` leaving a frame is redirected to a proxy label, memoized per
//! destination. When the frame's try statement is closed the rewriter emits,
//! at each proxy, a call to the frame's finally handler followed by a jump to
//! the parent's proxy for the same destination.

use crate::state::{NOT_STARTED_OR_RUNNING, StateNumber};
use cinder_bound::{BoundFactory, LabelId, MethodId};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use tracing::trace;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u32);

impl FrameId {
    pub const ROOT: Self = Self(0);

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Debug)]
pub struct FinallyFrame {
    pub finalize_state: StateNumber,
    pub parent: Option<FrameId>,
    /// Synthesized method running this frame's finally block.
    pub handler: Option<MethodId>,
    /// State -> immediate child frame owning it, in registration order.
    pub known_states: IndexMap<StateNumber, FrameId>,
    /// Labels declared inside the try statement; jumping to them does not
    /// leave the frame.
    pub labels: FxHashSet<LabelId>,
    /// Destination outside the frame -> proxy label, in creation order.
    pub proxy_labels: IndexMap<LabelId, LabelId>,
}

impl FinallyFrame {
    pub const fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

#[derive(Clone, Debug)]
pub struct FinallyFrameTree {
    frames: Vec<FinallyFrame>,
}

impl Default for FinallyFrameTree {
    fn default() -> Self {
        Self::new()
    }
}

impl FinallyFrameTree {
    pub fn new() -> Self {
        Self {
            frames: vec![FinallyFrame {
                finalize_state: NOT_STARTED_OR_RUNNING,
                parent: None,
                handler: None,
                known_states: IndexMap::new(),
                labels: FxHashSet::default(),
                proxy_labels: IndexMap::new(),
            }],
        }
    }

    #[inline]
    pub fn get(&self, frame: FrameId) -> &FinallyFrame {
        &self.frames[frame.index()]
    }

    pub fn root(&self) -> &FinallyFrame {
        self.get(FrameId::ROOT)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Were any frames besides the root created?
    pub fn has_nested_frames(&self) -> bool {
        self.frames.len() > 1
    }

    /// Create a child of `parent` and register its finalize state upward.
    pub fn push(
        &mut self,
        parent: FrameId,
        finalize_state: StateNumber,
        handler: MethodId,
        labels: FxHashSet<LabelId>,
    ) -> FrameId {
        let id = FrameId(self.frames.len() as u32);
        self.frames.push(FinallyFrame {
            finalize_state,
            parent: Some(parent),
            handler: Some(handler),
            known_states: IndexMap::new(),
            labels,
            proxy_labels: IndexMap::new(),
        });
        trace!(frame = id.0, parent = parent.0, finalize_state, "push finally frame");
        self.add_state(id, finalize_state);
        id
    }

    /// Record that `state` is owned by `frame`, in every ancestor.
    pub fn add_state(&mut self, frame: FrameId, state: StateNumber) {
        let mut child = frame;
        let mut current = self.get(frame).parent;
        while let Some(ancestor) = current {
            self.frames[ancestor.index()]
                .known_states
                .insert(state, child);
            child = ancestor;
            current = self.get(ancestor).parent;
        }
    }

    /// Would a jump from inside `frame` to `label` leave the frame?
    pub fn requires_proxy(&self, frame: FrameId, label: LabelId) -> bool {
        let frame = self.get(frame);
        !frame.is_root() && !frame.labels.contains(&label)
    }

    /// `label` itself when the jump stays in the frame (or the frame is the
    /// root), otherwise the frame's proxy for it.
    pub fn proxy_label_if_needed(
        &mut self,
        frame: FrameId,
        label: LabelId,
        factory: &mut BoundFactory,
    ) -> LabelId {
        if !self.requires_proxy(frame, label) {
            return label;
        }
        if let Some(proxy) = self.get(frame).proxy_labels.get(&label) {
            return *proxy;
        }
        let hint = format!("proxy_{}", factory.label_name(label));
        let proxy = factory.generate_label(&hint);
        self.frames[frame.index()]
            .proxy_labels
            .insert(label, proxy);
        trace!(frame = frame.0, label = label.0, proxy = proxy.0, "proxy label");
        proxy
    }

    /// `frame`'s known states grouped by the child owning them, children in
    /// order of first registration.
    pub fn states_by_child(&self, frame: FrameId) -> IndexMap<FrameId, SmallVec<[StateNumber; 4]>> {
        let mut groups: IndexMap<FrameId, SmallVec<[StateNumber; 4]>> = IndexMap::new();
        for (&state, &child) in &self.get(frame).known_states {
            groups.entry(child).or_default().push(state);
        }
        groups
    }
}

#[cfg(test)]
#[path = "../tests/finally_frame_tests.rs"]
mod tests;
