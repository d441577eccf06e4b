use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::trace;

use crate::backend::execution_list::{ExecSlot, ExecutionList};
use crate::backend::issue_queue::IQ;
use crate::backend::rename_map_table::RMT;
use crate::backend::reorder_buffer::ROB;
use crate::cpu::{CPUConfig, PerfCounters};
use crate::instructions::instructions::{Instruction, Stage, StageBuffer};

/// Everything past decode: rename, register read, dispatch, issue, execute,
/// writeback and retire, together with the structures they share. Within a
/// tick the stages run in reverse pipeline order so that every stage sees
/// the previous cycle's state of its successor and an instruction advances
/// by at most one stage per cycle.
pub(crate) struct Backend {
    rename_buffer: Rc<RefCell<StageBuffer>>,
    reg_read_buffer: StageBuffer,
    dispatch_buffer: StageBuffer,
    writeback_buffer: StageBuffer,
    rob: ROB,
    rmt: RMT,
    iq: IQ,
    execution_list: ExecutionList,
    n_wide: usize,
    pub(crate) retired: VecDeque<Instruction>,
    perf_counters: Rc<RefCell<PerfCounters>>,
}

impl Backend {
    pub(crate) fn new(
        cpu_config: &CPUConfig,
        rename_buffer: Rc<RefCell<StageBuffer>>,
        perf_counters: Rc<RefCell<PerfCounters>>,
    ) -> Backend {
        let width = cpu_config.width as usize;

        Backend {
            rename_buffer,
            reg_read_buffer: StageBuffer::new(width),
            dispatch_buffer: StageBuffer::new(width),
            writeback_buffer: StageBuffer::new(width * 5),
            rob: ROB::new(cpu_config.rob_size as usize),
            rmt: RMT::new(),
            iq: IQ::new(cpu_config.iq_size as usize),
            execution_list: ExecutionList::new(width * 5),
            n_wide: width,
            retired: VecDeque::new(),
            perf_counters,
        }
    }

    pub(crate) fn do_cycle(&mut self) {
        self.cycle_retire();
        self.cycle_writeback();
        self.cycle_execute();
        self.cycle_issue();
        self.cycle_dispatch();
        self.cycle_reg_read();
        self.cycle_rename();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rename_buffer.borrow().is_empty()
            && self.reg_read_buffer.is_empty()
            && self.dispatch_buffer.is_empty()
            && self.writeback_buffer.is_empty()
            && self.execution_list.is_empty()
            && self.iq.is_empty()
            && self.rob.is_empty()
    }

    fn cycle_rename(&mut self) {
        let mut perf_counters = self.perf_counters.borrow_mut();
        let cycle = perf_counters.cycle_cnt;
        let mut rename_buffer = self.rename_buffer.borrow_mut();

        // An instruction stalled here by a full ROB keeps its entry stamp
        // and accrues rename duration.
        for instr in rename_buffer.iter_mut() {
            instr.enter(Stage::Rename, cycle);
        }

        // checked once per cycle; admitting a full width must be atomic
        if !self.rob.has_space_for(self.n_wide) || !self.reg_read_buffer.has_room() {
            return;
        }

        while !rename_buffer.is_empty() && self.reg_read_buffer.has_room() {
            let mut instr = rename_buffer.pop().unwrap();

            let rob_tag = self.rob.allocate();

            if let Some(src1) = instr.src1 {
                let entry = self.rmt.get(src1);
                if entry.valid {
                    instr.src1_tag = Some(entry.rob_tag);
                }
            }
            if let Some(src2) = instr.src2 {
                let entry = self.rmt.get(src2);
                if entry.valid {
                    instr.src2_tag = Some(entry.rob_tag);
                }
            }

            if let Some(dest) = instr.dest {
                self.rmt.update(dest, rob_tag);
            }

            instr.dest_tag = Some(rob_tag);
            instr.leave(Stage::Rename, cycle);

            let slot = self.rob.get_mut(rob_tag);
            slot.valid = true;
            slot.ready = false;
            slot.dest_arch_reg = instr.dest;
            slot.instr = Some(instr.clone());

            trace!("renamed [{}] into rob slot {}", instr.seq, rob_tag);
            perf_counters.rename_cnt += 1;
            self.reg_read_buffer.push(instr);
        }
    }

    fn cycle_reg_read(&mut self) {
        let cycle = self.perf_counters.borrow().cycle_cnt;

        for instr in self.reg_read_buffer.iter_mut() {
            instr.enter(Stage::RegRead, cycle);
        }

        while !self.reg_read_buffer.is_empty() && self.dispatch_buffer.has_room() {
            let mut instr = self.reg_read_buffer.pop().unwrap();
            snap_ready_sources(&self.rob, &mut instr);
            instr.leave(Stage::RegRead, cycle);
            self.dispatch_buffer.push(instr);
        }
    }

    fn cycle_dispatch(&mut self) {
        let mut perf_counters = self.perf_counters.borrow_mut();
        let cycle = perf_counters.cycle_cnt;

        for instr in self.dispatch_buffer.iter_mut() {
            instr.enter(Stage::Dispatch, cycle);
        }

        if !self.iq.has_space_for(self.n_wide) {
            return;
        }

        while !self.dispatch_buffer.is_empty() {
            let mut instr = self.dispatch_buffer.pop().unwrap();
            snap_ready_sources(&self.rob, &mut instr);
            instr.leave(Stage::Dispatch, cycle);
            perf_counters.dispatch_cnt += 1;
            self.iq.insert(instr);
        }
    }

    fn cycle_issue(&mut self) {
        // in-flight cap; the whole stage is a no-op under back-pressure
        if self.execution_list.is_full() {
            return;
        }

        let mut perf_counters = self.perf_counters.borrow_mut();
        let cycle = perf_counters.cycle_cnt;

        for slot in self.iq.slots.iter_mut() {
            if !slot.valid {
                continue;
            }
            slot.instr.as_mut().unwrap().enter(Stage::Issue, cycle);
        }

        for _ in 0..self.n_wide {
            let index = match self.iq.select_ready() {
                Some(index) => index,
                None => return,
            };

            let mut instr = self.iq.remove(index);
            instr.leave(Stage::Issue, cycle);

            let latency = instr.op.latency();
            trace!("issued [{}] with latency {}", instr.seq, latency);
            perf_counters.issue_cnt += 1;

            self.execution_list.push(ExecSlot {
                instr,
                remaining_cycles: latency,
            });
        }
    }

    fn cycle_execute(&mut self) {
        if self.execution_list.is_empty() {
            return;
        }

        let mut perf_counters = self.perf_counters.borrow_mut();
        let cycle = perf_counters.cycle_cnt;

        for slot in self.execution_list.iter_mut() {
            slot.instr.enter(Stage::Execute, cycle);
            // an entry already at zero is a completion deferred on
            // writeback back-pressure, not still executing
            if slot.remaining_cycles > 0 {
                slot.remaining_cycles -= 1;
            }
        }

        // single completion pass; every finished entry is handled once
        let mut index = 0;
        while index < self.execution_list.len() {
            if self.execution_list.get(index).remaining_cycles > 0 {
                index += 1;
                continue;
            }

            let dest_tag = self.execution_list.get(index).instr.dest_tag.unwrap();
            broadcast_wakeup(
                &mut self.iq,
                &mut self.dispatch_buffer,
                &mut self.reg_read_buffer,
                dest_tag,
            );

            if !self.writeback_buffer.has_room() {
                // completed work is never dropped; retry the move next cycle
                index += 1;
                continue;
            }

            let mut slot = self.execution_list.remove(index);
            slot.instr.leave(Stage::Execute, cycle);
            slot.instr.valid = true;

            trace!("executed [{}]", slot.instr.seq);
            perf_counters.execute_cnt += 1;
            self.writeback_buffer.push(slot.instr);
        }
    }

    fn cycle_writeback(&mut self) {
        let cycle = self.perf_counters.borrow().cycle_cnt;

        for instr in self.writeback_buffer.iter_mut() {
            instr.enter(Stage::Writeback, cycle);
        }

        // the buffer fully drains every cycle
        while let Some(mut instr) = self.writeback_buffer.pop() {
            debug_assert!(instr.valid, "writeback requires a completed instruction");

            instr.leave(Stage::Writeback, cycle);

            // an instruction's destination tag is its own ROB slot
            let rob_tag = instr.dest_tag.unwrap();
            let slot = self.rob.get_mut(rob_tag);
            debug_assert!(slot.valid, "rob slot {} written back while unoccupied", rob_tag);
            debug_assert!(
                slot.instr.as_ref().unwrap().seq == instr.seq,
                "rob slot {} holds [{}], expected [{}]",
                rob_tag,
                slot.instr.as_ref().unwrap().seq,
                instr.seq
            );

            slot.ready = true;
            slot.instr = Some(instr);
        }
    }

    fn cycle_retire(&mut self) {
        if self.rob.is_empty() {
            return;
        }

        let mut perf_counters = self.perf_counters.borrow_mut();
        let cycle = perf_counters.cycle_cnt;

        for slot in self.rob.slots.iter_mut() {
            if !slot.ready {
                continue;
            }
            if let Some(instr) = slot.instr.as_mut() {
                instr.enter(Stage::Retire, cycle);
            }
        }

        for _ in 0..self.n_wide {
            let head = self.rob.head;
            {
                let slot = self.rob.get(head);
                if !slot.valid || !slot.ready {
                    break;
                }
            }

            let slot = self.rob.get_mut(head);
            let mut instr = slot.instr.take().unwrap();
            let dest_arch_reg = slot.dest_arch_reg;
            slot.valid = false;
            self.rob.advance_head();

            instr.leave(Stage::Retire, cycle);

            // Only the most recent producer owns the mapping; a retiring
            // instruction whose destination was renamed again leaves the
            // RMT alone.
            if let Some(dest) = dest_arch_reg {
                let entry = self.rmt.get(dest);
                if entry.valid && entry.rob_tag == head {
                    self.rmt.clear(dest);
                }
            }

            trace!("retired [{}]", instr.seq);
            perf_counters.retired_cnt += 1;
            self.retired.push_back(instr);
        }
    }
}

// An operand whose producer has already written back needs no wakeup; the
// value is sitting in the ROB. Applied on the way into the dispatch buffer
// and again on the way into the issue queue.
fn snap_ready_sources(rob: &ROB, instr: &mut Instruction) {
    if let Some(tag) = instr.src1_tag {
        if rob.get(tag).ready {
            instr.src1_tag = None;
        }
    }
    if let Some(tag) = instr.src2_tag {
        if rob.get(tag).ready {
            instr.src2_tag = None;
        }
    }
}

// The canonical wakeup: when a producer completes execution, every
// consumer still waiting on its tag, wherever it sits, drops the
// dependency. Runs before issue observes the queue in the same tick.
fn broadcast_wakeup(
    iq: &mut IQ,
    dispatch_buffer: &mut StageBuffer,
    reg_read_buffer: &mut StageBuffer,
    dest_tag: usize,
) {
    for slot in iq.slots.iter_mut() {
        if !slot.valid {
            continue;
        }
        clear_matching_sources(slot.instr.as_mut().unwrap(), dest_tag);
    }

    for instr in dispatch_buffer.iter_mut() {
        clear_matching_sources(instr, dest_tag);
    }

    for instr in reg_read_buffer.iter_mut() {
        clear_matching_sources(instr, dest_tag);
    }
}

fn clear_matching_sources(instr: &mut Instruction, dest_tag: usize) {
    if instr.src1_tag == Some(dest_tag) {
        instr.src1_tag = None;
    }
    if instr.src2_tag == Some(dest_tag) {
        instr.src2_tag = None;
    }
}
