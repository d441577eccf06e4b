use crate::instructions::instructions::{Instruction, RegisterType};

pub(crate) struct ROBSlot {
    pub(crate) valid: bool,
    // Deliberately left set after retirement until the slot is reallocated:
    // a consumer stalled upstream with a stale tag still snaps against it.
    pub(crate) ready: bool,
    pub(crate) instr: Option<Instruction>,
    pub(crate) dest_arch_reg: Option<RegisterType>,
}

/// The Reorder Buffer: a circular array of in-flight instructions. A slot
/// index doubles as the rename tag for the destination of the instruction
/// occupying it, so the ROB is also the tag space of the whole pipeline.
/// Slots are allocated at the tail during rename and released at the head
/// during retire, in sequence-number order.
pub(crate) struct ROB {
    pub(crate) capacity: usize,
    pub(crate) head: usize,
    pub(crate) tail: usize,
    pub(crate) slots: Vec<ROBSlot>,
}

impl ROB {
    pub(crate) fn new(capacity: usize) -> ROB {
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(ROBSlot {
                valid: false,
                ready: false,
                instr: None,
                dest_arch_reg: None,
            });
        }

        ROB {
            capacity,
            head: 0,
            tail: 0,
            slots,
        }
    }

    pub(crate) fn get(&self, index: usize) -> &ROBSlot {
        &self.slots[index]
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> &mut ROBSlot {
        &mut self.slots[index]
    }

    pub(crate) fn allocate(&mut self) -> usize {
        debug_assert!(
            !self.slots[self.tail].valid,
            "ROB: can't allocate slot {}, it is still occupied",
            self.tail
        );

        let index = self.tail;
        self.tail = (self.tail + 1) % self.capacity;
        index
    }

    pub(crate) fn advance_head(&mut self) {
        self.head = (self.head + 1) % self.capacity;
    }

    fn free_slots(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.valid).count()
    }

    // Admission is atomic per cycle: rename admits up to a full width, so
    // the ROB counts as full once fewer than that many slots are free.
    pub(crate) fn has_space_for(&self, count: usize) -> bool {
        self.free_slots() >= count
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| !slot.valid)
    }
}
