use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::cpu::{CPUConfig, PerfCounters};
use crate::instructions::instructions::{Instruction, Stage, StageBuffer};
use crate::loader::loader::TraceReader;

/// The in-order front of the pipeline: fetch from the trace and decode.
/// Decoded instructions are handed to the backend through the shared
/// rename buffer.
pub(crate) struct Frontend {
    trace_reader: TraceReader,
    decode_buffer: StageBuffer,
    rename_buffer: Rc<RefCell<StageBuffer>>,
    n_wide: usize,
    trace_done: bool,
    perf_counters: Rc<RefCell<PerfCounters>>,
}

impl Frontend {
    pub(crate) fn new(
        cpu_config: &CPUConfig,
        trace_reader: TraceReader,
        rename_buffer: Rc<RefCell<StageBuffer>>,
        perf_counters: Rc<RefCell<PerfCounters>>,
    ) -> Frontend {
        Frontend {
            trace_reader,
            decode_buffer: StageBuffer::new(cpu_config.width as usize),
            rename_buffer,
            n_wide: cpu_config.width as usize,
            trace_done: false,
            perf_counters,
        }
    }

    pub(crate) fn do_cycle(&mut self) {
        self.cycle_decode();
        self.cycle_fetch();
    }

    pub(crate) fn is_done(&self) -> bool {
        self.trace_done && self.decode_buffer.is_empty()
    }

    fn cycle_decode(&mut self) {
        let cycle = self.perf_counters.borrow().cycle_cnt;

        for instr in self.decode_buffer.iter_mut() {
            instr.enter(Stage::Decode, cycle);
        }

        let mut rename_buffer = self.rename_buffer.borrow_mut();
        while !self.decode_buffer.is_empty() && rename_buffer.has_room() {
            let mut instr = self.decode_buffer.pop().unwrap();
            instr.leave(Stage::Decode, cycle);
            rename_buffer.push(instr);
        }
    }

    fn cycle_fetch(&mut self) {
        if self.trace_done {
            return;
        }
        // capacity is checked once; a partially drained buffer still
        // admits a full width of records
        if self.decode_buffer.len() >= self.n_wide {
            return;
        }

        let mut perf_counters = self.perf_counters.borrow_mut();
        let cycle = perf_counters.cycle_cnt;

        for _ in 0..self.n_wide {
            let record = match self.trace_reader.next_record() {
                Some(record) => record,
                None => {
                    self.trace_done = true;
                    debug!("trace exhausted after {} instructions", perf_counters.instr_cnt);
                    return;
                }
            };

            let seq = perf_counters.instr_cnt;
            perf_counters.instr_cnt += 1;

            let mut instr = Instruction::new(&record, seq);
            instr.enter(Stage::Fetch, cycle);
            instr.leave(Stage::Fetch, cycle);

            trace!("fetched [{}] pc={:x}", seq, instr.pc);
            self.decode_buffer.push(instr);
        }
    }
}
