use std::collections::VecDeque;
use std::fmt;
use std::fmt::Display;

pub(crate) type RegisterType = u8;

/// The raw five-field record read from the trace: a program counter, the
/// function-unit type and three architectural register operands. `None`
/// stands for the -1 "no register" sentinel of the trace format.
#[derive(Clone, Copy, PartialEq, Debug)]
pub(crate) struct TraceRecord {
    pub(crate) pc: u64,
    pub(crate) op: OpType,
    pub(crate) dest: Option<RegisterType>,
    pub(crate) src1: Option<RegisterType>,
    pub(crate) src2: Option<RegisterType>,
}

#[derive(Clone, Copy, PartialEq, Debug)]
pub(crate) enum OpType {
    ALU,
    MUL,
    MEM,
}

impl OpType {
    // every code other than 0 and 1 takes the memory latency
    pub(crate) fn from_code(code: i64) -> OpType {
        match code {
            0 => OpType::ALU,
            1 => OpType::MUL,
            _ => OpType::MEM,
        }
    }

    pub(crate) fn code(&self) -> u32 {
        match self {
            OpType::ALU => 0,
            OpType::MUL => 1,
            OpType::MEM => 2,
        }
    }

    // the number of cycles an instruction occupies the execution list
    pub(crate) fn latency(&self) -> u64 {
        match self {
            OpType::ALU => 1,
            OpType::MUL => 2,
            OpType::MEM => 5,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Stage {
    Fetch,
    Decode,
    Rename,
    RegRead,
    Dispatch,
    Issue,
    Execute,
    Writeback,
    Retire,
}

impl Stage {
    pub(crate) const COUNT: usize = 9;

    pub(crate) const ALL: [Stage; Stage::COUNT] = [
        Stage::Fetch,
        Stage::Decode,
        Stage::Rename,
        Stage::RegRead,
        Stage::Dispatch,
        Stage::Issue,
        Stage::Execute,
        Stage::Writeback,
        Stage::Retire,
    ];

    pub(crate) fn mnemonic(&self) -> &'static str {
        match self {
            Stage::Fetch => "FE",
            Stage::Decode => "DE",
            Stage::Rename => "RN",
            Stage::RegRead => "RR",
            Stage::Dispatch => "DI",
            Stage::Issue => "IS",
            Stage::Execute => "EX",
            Stage::Writeback => "WB",
            Stage::Retire => "RT",
        }
    }
}

/// Timing of one instruction in one stage: the first cycle the instruction
/// was observed there and the number of cycles it spent there.
#[derive(Clone, Copy, Default, Debug)]
pub(crate) struct StageTiming {
    pub(crate) cycle: Option<u64>,
    pub(crate) duration: u64,
}

/// A single dynamic instruction, carried through the whole pipeline. The
/// rename tags are reorder-buffer slot indices; `None` means the operand is
/// available from the architectural register file.
#[derive(Clone, Debug)]
pub(crate) struct Instruction {
    pub(crate) pc: u64,
    pub(crate) op: OpType,
    pub(crate) dest: Option<RegisterType>,
    pub(crate) src1: Option<RegisterType>,
    pub(crate) src2: Option<RegisterType>,
    pub(crate) seq: u64,
    pub(crate) dest_tag: Option<usize>,
    pub(crate) src1_tag: Option<usize>,
    pub(crate) src2_tag: Option<usize>,
    // set once execution has completed; checked by writeback
    pub(crate) valid: bool,
    timings: [StageTiming; Stage::COUNT],
}

impl Instruction {
    pub(crate) fn new(record: &TraceRecord, seq: u64) -> Instruction {
        Instruction {
            pc: record.pc,
            op: record.op,
            dest: record.dest,
            src1: record.src1,
            src2: record.src2,
            seq,
            dest_tag: None,
            src1_tag: None,
            src2_tag: None,
            valid: false,
            timings: [StageTiming::default(); Stage::COUNT],
        }
    }

    pub(crate) fn timing(&self, stage: Stage) -> StageTiming {
        self.timings[stage as usize]
    }

    // Records the first cycle the instruction is observed in the stage; a
    // no-op on every later observation while it is stalled there.
    pub(crate) fn enter(&mut self, stage: Stage, cycle: u64) {
        let timing = &mut self.timings[stage as usize];
        if timing.cycle.is_none() {
            timing.cycle = Some(cycle);
        }
    }

    pub(crate) fn leave(&mut self, stage: Stage, cycle: u64) {
        let timing = &mut self.timings[stage as usize];
        debug_assert!(timing.cycle.is_some(), "leaving {:?} without entering it", stage);
        timing.duration = cycle - timing.cycle.unwrap() + 1;
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} fu{{{}}} src{{{},{}}} dst{{{}}}",
            self.seq,
            self.op.code(),
            RegDisplay(self.src1),
            RegDisplay(self.src2),
            RegDisplay(self.dest)
        )?;

        for stage in Stage::ALL {
            let timing = self.timing(stage);
            write!(
                f,
                " {}{{{},{}}}",
                stage.mnemonic(),
                timing.cycle.map_or(-1, |cycle| cycle as i64),
                timing.duration
            )?;
        }

        Ok(())
    }
}

pub(crate) struct RegDisplay(pub(crate) Option<RegisterType>);

impl Display for RegDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(reg) => write!(f, "{}", reg),
            None => write!(f, "-1"),
        }
    }
}

/// An in-order buffer between two adjacent stages. The upstream stage
/// appends at the tail, the downstream stage removes from the head. The
/// capacity is an admission bound checked by the stages, not a hard push
/// limit: fetch checks it once and may then push a full width of records.
pub(crate) struct StageBuffer {
    capacity: usize,
    slots: VecDeque<Instruction>,
}

impl StageBuffer {
    pub(crate) fn new(capacity: usize) -> StageBuffer {
        StageBuffer {
            capacity,
            slots: VecDeque::with_capacity(capacity),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn has_room(&self) -> bool {
        self.slots.len() < self.capacity
    }

    pub(crate) fn push(&mut self, instr: Instruction) {
        self.slots.push_back(instr);
    }

    pub(crate) fn pop(&mut self) -> Option<Instruction> {
        self.slots.pop_front()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Instruction> {
        self.slots.iter_mut()
    }
}
