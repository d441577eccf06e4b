use crate::instructions::instructions::{Instruction, Stage};

pub(crate) struct IQSlot {
    pub(crate) valid: bool,
    pub(crate) instr: Option<Instruction>,
}

/// The Issue Queue: an unordered set of instructions waiting for their
/// source operands. Slots have no age order; selection scans the whole
/// queue for the oldest ready entry.
pub(crate) struct IQ {
    pub(crate) slots: Vec<IQSlot>,
}

impl IQ {
    pub(crate) fn new(capacity: usize) -> IQ {
        let mut slots = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            slots.push(IQSlot { valid: false, instr: None });
        }
        IQ { slots }
    }

    fn free_slots(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.valid).count()
    }

    // Same atomic admission rule as the ROB: dispatch needs room for a
    // full width before it moves anything.
    pub(crate) fn has_space_for(&self, count: usize) -> bool {
        self.free_slots() >= count
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| !slot.valid)
    }

    pub(crate) fn insert(&mut self, instr: Instruction) {
        for slot in self.slots.iter_mut() {
            if slot.valid {
                continue;
            }
            slot.valid = true;
            slot.instr = Some(instr);
            return;
        }
        unreachable!("IQ: insert without a free slot");
    }

    pub(crate) fn remove(&mut self, index: usize) -> Instruction {
        let slot = &mut self.slots[index];
        debug_assert!(slot.valid, "IQ: can't remove from empty slot {}", index);
        slot.valid = false;
        slot.instr.take().unwrap()
    }

    /// Picks the ready entry (both source tags resolved) with the smallest
    /// fetch cycle; the smallest slot index wins a tie.
    pub(crate) fn select_ready(&self) -> Option<usize> {
        let mut oldest: Option<(u64, usize)> = None;

        for (index, slot) in self.slots.iter().enumerate() {
            if !slot.valid {
                continue;
            }
            let instr = slot.instr.as_ref().unwrap();
            if instr.src1_tag.is_some() || instr.src2_tag.is_some() {
                continue;
            }

            let fetch_cycle = instr.timing(Stage::Fetch).cycle.unwrap();
            match oldest {
                Some((cycle, _)) if fetch_cycle >= cycle => {}
                _ => oldest = Some((fetch_cycle, index)),
            }
        }

        oldest.map(|(_, index)| index)
    }
}
