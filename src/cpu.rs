use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use crate::backend::backend::Backend;
use crate::frontend::frontend::Frontend;
use crate::instructions::instructions::{Instruction, StageBuffer};
use crate::loader::loader::TraceReader;

#[derive(Clone, Debug)]
pub(crate) struct CPUConfig {
    // the capacity of the reorder buffer
    pub(crate) rob_size: u32,
    // the capacity of the issue queue
    pub(crate) iq_size: u32,
    // the number of instructions any stage can admit or emit per clock cycle
    pub(crate) width: u32,
}

impl Default for CPUConfig {
    fn default() -> CPUConfig {
        CPUConfig {
            rob_size: 64,
            iq_size: 16,
            width: 2,
        }
    }
}

pub(crate) struct PerfCounters {
    pub(crate) instr_cnt: u64,
    pub(crate) rename_cnt: u64,
    pub(crate) dispatch_cnt: u64,
    pub(crate) issue_cnt: u64,
    pub(crate) execute_cnt: u64,
    pub(crate) retired_cnt: u64,
    pub(crate) cycle_cnt: u64,
}

impl PerfCounters {
    pub(crate) fn new() -> PerfCounters {
        PerfCounters {
            instr_cnt: 0,
            rename_cnt: 0,
            dispatch_cnt: 0,
            issue_cnt: 0,
            execute_cnt: 0,
            retired_cnt: 0,
            cycle_cnt: 0,
        }
    }

    pub(crate) fn ipc(&self) -> f64 {
        if self.cycle_cnt == 0 {
            return 0.0;
        }
        self.instr_cnt as f64 / self.cycle_cnt as f64
    }
}

/// The simulated core. One call to `do_cycle` is one tick of the logical
/// clock: the backend drains first, then the frontend, so that within a
/// tick every stage observes the previous cycle's state of its successor.
pub(crate) struct CPU {
    frontend: Frontend,
    backend: Backend,
    pub(crate) perf_counters: Rc<RefCell<PerfCounters>>,
}

impl CPU {
    pub(crate) fn new(cpu_config: &CPUConfig, trace_reader: TraceReader) -> CPU {
        let perf_counters = Rc::new(RefCell::new(PerfCounters::new()));
        let rename_buffer = Rc::new(RefCell::new(StageBuffer::new(cpu_config.width as usize)));

        let backend = Backend::new(
            cpu_config,
            Rc::clone(&rename_buffer),
            Rc::clone(&perf_counters),
        );

        let frontend = Frontend::new(
            cpu_config,
            trace_reader,
            Rc::clone(&rename_buffer),
            Rc::clone(&perf_counters),
        );

        CPU {
            frontend,
            backend,
            perf_counters,
        }
    }

    /// Runs the simulation until the trace is exhausted and the pipeline
    /// has drained, handing every retired instruction to `on_retire` in
    /// retirement order.
    pub(crate) fn run(&mut self, mut on_retire: impl FnMut(&Instruction)) {
        loop {
            self.backend.do_cycle();
            self.frontend.do_cycle();

            while let Some(instr) = self.backend.retired.pop_front() {
                on_retire(&instr);
            }

            self.perf_counters.borrow_mut().cycle_cnt += 1;

            if self.frontend.is_done() && self.backend.is_empty() {
                break;
            }
        }

        let perf_counters = self.perf_counters.borrow();
        debug!(
            "simulation complete: instructions={} renamed={} dispatched={} issued={} executed={} retired={} cycles={} ipc={:.2}",
            perf_counters.instr_cnt,
            perf_counters.rename_cnt,
            perf_counters.dispatch_cnt,
            perf_counters.issue_cnt,
            perf_counters.execute_cnt,
            perf_counters.retired_cnt,
            perf_counters.cycle_cnt,
            perf_counters.ipc()
        );
    }
}
