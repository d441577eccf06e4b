#[cfg(test)]
mod tests {
    use crate::cpu::{CPUConfig, CPU};
    use crate::instructions::instructions::{Instruction, OpType, Stage};
    use crate::loader::loader::TraceReader;

    #[test]
    fn test_single_instruction() {
        let trace = "0 0 1 2 3\n";

        let mut harness = TestHarness::new(8, 4, 1);
        harness.run(trace);

        assert_eq!(harness.instr_cnt, 1);
        assert_eq!(harness.cycle_cnt, 9);
        assert_eq!(format!("{:.2}", harness.ipc), "0.11");

        harness.assert_timing(0, Stage::Fetch, 0, 1);
        harness.assert_timing(0, Stage::Decode, 1, 1);
        harness.assert_timing(0, Stage::Rename, 2, 1);
        harness.assert_timing(0, Stage::RegRead, 3, 1);
        harness.assert_timing(0, Stage::Dispatch, 4, 1);
        harness.assert_timing(0, Stage::Issue, 5, 1);
        harness.assert_timing(0, Stage::Execute, 6, 1);
        harness.assert_timing(0, Stage::Writeback, 7, 1);
        harness.assert_timing(0, Stage::Retire, 8, 1);

        harness.assert_pipeline_invariants();
    }

    #[test]
    fn test_output_line_format() {
        let trace = "0 0 1 2 3\n";

        let mut harness = TestHarness::new(8, 4, 1);
        harness.run(trace);

        assert_eq!(
            format!("{}", harness.retired(0)),
            "0 fu{0} src{2,3} dst{1} FE{0,1} DE{1,1} RN{2,1} RR{3,1} DI{4,1} \
             IS{5,1} EX{6,1} WB{7,1} RT{8,1}"
        );
    }

    #[test]
    fn test_output_line_without_registers() {
        let trace = "1a2b 2 -1 -1 -1\n";

        let mut harness = TestHarness::new(8, 4, 1);
        harness.run(trace);

        assert_eq!(
            format!("{}", harness.retired(0)),
            "0 fu{2} src{-1,-1} dst{-1} FE{0,1} DE{1,1} RN{2,1} RR{3,1} DI{4,1} \
             IS{5,1} EX{6,5} WB{11,1} RT{12,1}"
        );
    }

    // Three instructions where each reads its predecessor's destination.
    // A consumer can enter execution no earlier than the cycle after its
    // producer finished there; with single-cycle producers the chain runs
    // back to back.
    #[test]
    fn test_dependency_chain() {
        let trace = "\
0 0 1 -1 -1
0 0 2 1 -1
0 0 3 2 -1
";

        let mut harness = TestHarness::new(8, 4, 1);
        harness.run(trace);

        assert_eq!(harness.instr_cnt, 3);
        assert_eq!(harness.cycle_cnt, 11);

        harness.assert_timing(0, Stage::Issue, 5, 1);
        harness.assert_timing(1, Stage::Issue, 6, 1);
        harness.assert_timing(2, Stage::Issue, 7, 1);

        for seq in 1..3 {
            let producer = harness.retired(seq - 1);
            let consumer = harness.retired(seq);
            harness.assert_consumes_after(producer, consumer);
        }

        harness.assert_pipeline_invariants();
    }

    // Two independent single-cycle instructions on a 2-wide pipe move in
    // lockstep through every stage.
    #[test]
    fn test_independent_pair_width_2() {
        let trace = "\
0 0 1 -1 -1
0 0 2 -1 -1
";

        let mut harness = TestHarness::new(8, 4, 2);
        harness.run(trace);

        assert_eq!(harness.instr_cnt, 2);
        assert_eq!(harness.cycle_cnt, 9);

        for stage in Stage::ALL {
            assert_eq!(
                harness.retired(0).timing(stage).cycle,
                harness.retired(1).timing(stage).cycle,
                "{:?} entry cycles diverge",
                stage
            );
        }
        harness.assert_timing(0, Stage::Issue, 5, 1);
        harness.assert_timing(0, Stage::Retire, 8, 1);

        harness.assert_pipeline_invariants();
    }

    // A five-cycle producer gates its single-cycle consumer: the consumer
    // sits in the issue queue until the wakeup and executes right after
    // the producer completes.
    #[test]
    fn test_latency_mix() {
        let trace = "\
0 2 1 -1 -1
0 0 2 1 -1
";

        let mut harness = TestHarness::new(8, 4, 1);
        harness.run(trace);

        assert_eq!(harness.cycle_cnt, 14);

        harness.assert_timing(0, Stage::Execute, 6, 5);
        harness.assert_timing(0, Stage::Writeback, 11, 1);
        harness.assert_timing(1, Stage::Issue, 6, 5);
        harness.assert_timing(1, Stage::Execute, 11, 1);

        harness.assert_consumes_after(harness.retired(0), harness.retired(1));
        harness.assert_pipeline_invariants();
    }

    // Two writes to the same register followed by a read: the reader must
    // wait for the most recent producer, and the first producer's
    // retirement must not tear down the younger mapping.
    #[test]
    fn test_waw_keeps_latest_mapping() {
        let trace = "\
0 0 1 -1 -1
0 2 1 -1 -1
0 0 2 1 -1
";

        let mut harness = TestHarness::new(8, 4, 1);
        harness.run(trace);

        assert_eq!(harness.cycle_cnt, 15);

        // seq 1 is the mapping owner when seq 0 retires
        harness.assert_timing(1, Stage::Execute, 7, 5);
        harness.assert_timing(2, Stage::Issue, 7, 5);
        harness.assert_timing(2, Stage::Execute, 12, 1);

        harness.assert_consumes_after(harness.retired(1), harness.retired(2));
        harness.assert_pipeline_invariants();
    }

    // 32 independent five-cycle instructions against a four-entry ROB:
    // rename admits a batch only once the previous one has fully retired,
    // so the pipe settles into a ten-cycle batch rhythm.
    #[test]
    fn test_rob_full_stall() {
        let trace = "0 2 -1 -1 -1\n".repeat(32);

        let mut harness = TestHarness::new(4, 4, 4);
        harness.run(&trace);

        assert_eq!(harness.instr_cnt, 32);
        assert_eq!(harness.cycle_cnt, 83);

        for seq in 0..32 {
            let batch = seq / 4;
            harness.assert_timing(seq, Stage::Retire, 12 + 10 * batch, 1);
        }

        // the second batch stalls in rename for the whole first batch
        assert_eq!(harness.retired(4).timing(Stage::Rename).duration, 10);

        harness.assert_rob_occupancy_bound(4);
        harness.assert_pipeline_invariants();
    }

    // A two-entry issue queue choked by a slow producer: the dependents
    // occupy both slots, nothing issues while neither is ready, and
    // dispatch backs up waiting for a full width of free slots.
    #[test]
    fn test_iq_full_stall() {
        let trace = "\
0 2 1 -1 -1
0 0 2 1 -1
0 0 3 1 -1
0 0 -1 -1 -1
0 0 -1 -1 -1
0 0 -1 -1 -1
";

        let mut harness = TestHarness::new(32, 2, 2);
        harness.run(trace);

        assert_eq!(harness.instr_cnt, 6);
        assert_eq!(harness.cycle_cnt, 16);

        // the first dependent waits in the queue until the wakeup
        harness.assert_timing(1, Stage::Issue, 5, 6);
        // the second dependent is stuck in dispatch behind the full queue
        harness.assert_timing(2, Stage::Dispatch, 5, 6);

        // while both slots hold non-ready entries nothing issues
        let issue_ticks: Vec<u64> = (0..6)
            .map(|seq| {
                let timing = harness.retired(seq).timing(Stage::Issue);
                timing.cycle.unwrap() + timing.duration - 1
            })
            .collect();
        assert!(
            issue_ticks.iter().all(|tick| !(6..=9).contains(tick)),
            "instructions issued during the choked window: {:?}",
            issue_ticks
        );

        harness.assert_pipeline_invariants();
    }

    // A mixed workload; nothing asserted beyond the universal pipeline
    // invariants.
    #[test]
    fn test_mixed_workload_invariants() {
        let trace = "\
ffe0 0 3 1 2
ffe4 1 4 3 -1
ffe8 2 5 4 3
ffec 0 3 5 -1
fff0 2 6 -1 -1
fff4 1 7 6 3
fff8 0 1 7 5
fffc 0 -1 1 -1
10000 2 2 1 6
10004 0 8 2 2
10008 1 9 8 4
1000c 0 10 9 -1
";

        let mut harness = TestHarness::new(8, 4, 2);
        harness.run(trace);

        assert_eq!(harness.instr_cnt, 12);
        harness.assert_pipeline_invariants();
    }

    #[test]
    fn test_empty_trace() {
        let mut harness = TestHarness::new(8, 4, 2);
        harness.run("");

        assert_eq!(harness.instr_cnt, 0);
        assert!(harness.retired.is_empty());
        assert_eq!(harness.cycle_cnt, 1);
    }

    #[test]
    fn test_trace_reader_parses_record() {
        let mut reader = TraceReader::from_str("2b 1 5 -1 66\n");

        let record = reader.next_record().unwrap();
        assert_eq!(record.pc, 0x2b);
        assert_eq!(record.op, OpType::MUL);
        assert_eq!(record.dest, Some(5));
        assert_eq!(record.src1, None);
        assert_eq!(record.src2, Some(66));

        assert!(reader.next_record().is_none());
        assert!(reader.next_record().is_none());
    }

    #[test]
    fn test_trace_reader_short_record_ends_stream() {
        let mut reader = TraceReader::from_str("0 0 1\n0 0 2 -1 -1\n");
        assert!(reader.next_record().is_none());
        assert!(reader.next_record().is_none());
    }

    #[test]
    fn test_trace_reader_malformed_record_ends_stream() {
        let mut reader = TraceReader::from_str("0 0 1 -1 -1\nxyz\n0 0 2 -1 -1\n");
        assert!(reader.next_record().is_some());
        assert!(reader.next_record().is_none());
        assert!(reader.next_record().is_none());
    }

    #[test]
    fn test_trace_reader_accepts_prefixed_pc() {
        let mut reader = TraceReader::from_str("0x2b 1 5 -1 66\n0X10 0 -1 -1 -1\n");
        assert_eq!(reader.next_record().unwrap().pc, 0x2b);
        assert_eq!(reader.next_record().unwrap().pc, 0x10);
        assert!(reader.next_record().is_none());
    }

    // Out-of-range fields that still parse as integers are not malformed:
    // an op code past 1 runs at the memory latency and a register value
    // other than -1 is taken as a register index.
    #[test]
    fn test_trace_reader_accepts_out_of_range_fields() {
        let mut reader = TraceReader::from_str("0 7 1 -1 -1\n0 0 67 -1 -1\n");

        let record = reader.next_record().unwrap();
        assert_eq!(record.op, OpType::MEM);

        let record = reader.next_record().unwrap();
        assert_eq!(record.dest, Some(67));

        assert!(reader.next_record().is_none());
    }

    #[test]
    fn test_out_of_range_register_flows_through() {
        let trace = "\
0 0 70 -1 -1
0 0 1 70 -1
";

        let mut harness = TestHarness::new(8, 4, 1);
        harness.run(trace);

        assert_eq!(harness.instr_cnt, 2);
        harness.assert_consumes_after(harness.retired(0), harness.retired(1));
        harness.assert_pipeline_invariants();
    }

    struct TestHarness {
        cpu_config: CPUConfig,
        retired: Vec<Instruction>,
        instr_cnt: u64,
        cycle_cnt: u64,
        ipc: f64,
    }

    impl TestHarness {
        fn new(rob_size: u32, iq_size: u32, width: u32) -> TestHarness {
            TestHarness {
                cpu_config: CPUConfig {
                    rob_size,
                    iq_size,
                    width,
                },
                retired: Vec::new(),
                instr_cnt: 0,
                cycle_cnt: 0,
                ipc: 0.0,
            }
        }

        fn run(&mut self, trace: &str) {
            let mut cpu = CPU::new(&self.cpu_config, TraceReader::from_str(trace));

            let mut retired = Vec::new();
            cpu.run(|instr| retired.push(instr.clone()));
            self.retired = retired;

            let perf_counters = cpu.perf_counters.borrow();
            self.instr_cnt = perf_counters.instr_cnt;
            self.cycle_cnt = perf_counters.cycle_cnt;
            self.ipc = perf_counters.ipc();
        }

        fn retired(&self, seq: u64) -> &Instruction {
            self.retired
                .iter()
                .find(|instr| instr.seq == seq)
                .unwrap_or_else(|| panic!("[{}] never retired", seq))
        }

        fn assert_timing(&self, seq: u64, stage: Stage, cycle: u64, duration: u64) {
            let timing = self.retired(seq).timing(stage);
            assert_eq!(timing.cycle, Some(cycle), "[{}] {:?} entry cycle", seq, stage);
            assert_eq!(timing.duration, duration, "[{}] {:?} duration", seq, stage);
        }

        // A consumer's first execute observation lies past its producer's
        // completion, and neither issued and completed in one cycle.
        fn assert_consumes_after(&self, producer: &Instruction, consumer: &Instruction) {
            let producer_done = producer.timing(Stage::Execute).cycle.unwrap()
                + producer.op.latency()
                - 1;
            let consumer_exec = consumer.timing(Stage::Execute).cycle.unwrap();
            assert!(
                consumer_exec >= producer_done + 1,
                "[{}] executed at {} but its producer [{}] completed at {}",
                consumer.seq,
                consumer_exec,
                producer.seq,
                producer_done
            );
        }

        fn assert_pipeline_invariants(&self) {
            // retirement order is sequence order
            for pair in self.retired.windows(2) {
                assert!(
                    pair[0].seq < pair[1].seq,
                    "[{}] retired before [{}]",
                    pair[1].seq,
                    pair[0].seq
                );
            }

            for instr in &self.retired {
                let mut prev: Option<(Stage, u64, u64)> = None;
                for stage in Stage::ALL {
                    let timing = instr.timing(stage);
                    let cycle = timing
                        .cycle
                        .unwrap_or_else(|| panic!("[{}] never entered {:?}", instr.seq, stage));
                    assert!(timing.duration >= 1, "[{}] {:?} duration", instr.seq, stage);

                    if let Some((prev_stage, prev_cycle, prev_duration)) = prev {
                        assert_eq!(
                            cycle,
                            prev_cycle + prev_duration,
                            "[{}] left {:?} and entered {:?} with a gap",
                            instr.seq,
                            prev_stage,
                            stage
                        );
                    }
                    prev = Some((stage, cycle, timing.duration));
                }

                // no writeback back-pressure in these workloads, so the
                // execute-to-writeback distance is exactly the op latency
                let execute = instr.timing(Stage::Execute).cycle.unwrap();
                let writeback = instr.timing(Stage::Writeback).cycle.unwrap();
                assert_eq!(
                    writeback - execute,
                    instr.op.latency(),
                    "[{}] execute latency",
                    instr.seq
                );
            }
        }

        // A ROB slot is held from the tick rename allocated it up to (not
        // including) the tick it retired; at no cycle may more than
        // `rob_size` instructions hold slots at once.
        fn assert_rob_occupancy_bound(&self, rob_size: usize) {
            for cycle in 0..self.cycle_cnt {
                let occupied = self
                    .retired
                    .iter()
                    .filter(|instr| {
                        let rename = instr.timing(Stage::Rename);
                        let retire = instr.timing(Stage::Retire);
                        let allocated = rename.cycle.unwrap() + rename.duration - 1;
                        let released = retire.cycle.unwrap() + retire.duration - 1;
                        (allocated..released).contains(&cycle)
                    })
                    .count();
                assert!(
                    occupied <= rob_size,
                    "{} instructions held ROB slots in cycle {}",
                    occupied,
                    cycle
                );
            }
        }
    }
}
