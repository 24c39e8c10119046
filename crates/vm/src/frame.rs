//! Per-call frame storage.
//!
//! A frame holds the operand stack followed by the locals in one slot
//! region. Small frames keep the region inline; larger ones make exactly one
//! heap allocation, freed when the frame is dropped. Arguments are never
//! copied: `args` borrows the caller's top stack slots.

use elle_common::{Function, FunctionId};

/// Frames with at most this many stack + local slots are stored inline.
pub const INLINE_FRAME_SLOTS: usize = 8;

#[derive(Debug)]
enum Storage {
    Inline([i64; INLINE_FRAME_SLOTS]),
    Heap(Box<[i64]>),
}

/// The live frame of one call.
#[derive(Debug)]
pub struct Frame<'a> {
    storage: Storage,
    stack_slots: usize,
    local_slots: usize,
    sp: usize,
    args: &'a [i64],
}

impl<'a> Frame<'a> {
    /// Lay out a frame for `function`.
    pub fn new(function: &Function, args: &'a [i64]) -> Self {
        let slots = function.frame_slots();
        let storage = if slots <= INLINE_FRAME_SLOTS {
            Storage::Inline([0; INLINE_FRAME_SLOTS])
        } else {
            Storage::Heap(vec![0; slots].into_boxed_slice())
        };
        Self {
            storage,
            stack_slots: function.max_stack_depth,
            local_slots: function.local_count,
            sp: 0,
            args,
        }
    }

    pub fn is_heap(&self) -> bool {
        matches!(self.storage, Storage::Heap(_))
    }

    fn slots(&self) -> &[i64] {
        match &self.storage {
            Storage::Inline(slots) => &slots[..],
            Storage::Heap(slots) => &slots[..],
        }
    }

    fn slots_mut(&mut self) -> &mut [i64] {
        match &mut self.storage {
            Storage::Inline(slots) => &mut slots[..],
            Storage::Heap(slots) => &mut slots[..],
        }
    }

    /// The caller's argument slots.
    pub fn args(&self) -> &'a [i64] {
        self.args
    }

    /// Current operand stack depth.
    pub fn depth(&self) -> usize {
        self.sp
    }

    /// The live part of the operand stack, bottom first.
    pub fn stack(&self) -> &[i64] {
        &self.slots()[..self.sp]
    }

    pub fn locals(&self) -> &[i64] {
        &self.slots()[self.stack_slots..self.stack_slots + self.local_slots]
    }

    /// Push, or `None` if the stack region is full.
    pub fn push(&mut self, value: i64) -> Option<()> {
        if self.sp >= self.stack_slots {
            return None;
        }
        let sp = self.sp;
        self.slots_mut()[sp] = value;
        self.sp += 1;
        Some(())
    }

    pub fn pop(&mut self) -> Option<i64> {
        self.sp = self.sp.checked_sub(1)?;
        Some(self.slots()[self.sp])
    }

    pub fn peek(&self) -> Option<i64> {
        self.stack().last().copied()
    }

    /// Drop everything above `depth`.
    pub fn truncate(&mut self, depth: usize) {
        self.sp = self.sp.min(depth);
    }

    pub fn arg(&self, index: usize) -> Option<i64> {
        self.args.get(index).copied()
    }

    pub fn local(&self, index: usize) -> Option<i64> {
        self.locals().get(index).copied()
    }

    pub fn set_local(&mut self, index: usize, value: i64) -> Option<()> {
        if index >= self.local_slots {
            return None;
        }
        let slot = self.stack_slots + index;
        self.slots_mut()[slot] = value;
        Some(())
    }
}

/// One entry of the VM call chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLink {
    pub function: FunctionId,
    /// Whether the frame's slots live on the heap.
    pub heap: bool,
}

/// Frame allocation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub inline_frames: u64,
    pub heap_allocations: u64,
    pub heap_releases: u64,
}
