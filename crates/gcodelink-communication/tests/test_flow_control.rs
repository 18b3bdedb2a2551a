use gcodelink_communication::{
    CommandSource, ControllerResponse, FlowController, GrblResponseParser, LinkFramer,
    MockSerialLink, RealtimeCommand,
};
use proptest::prelude::*;
use std::time::{Duration, Instant};

fn flow_controller() -> (FlowController, gcodelink_communication::MockLinkHandle) {
    let (link, handle) = MockSerialLink::new();
    let fc = FlowController::new(LinkFramer::new(Box::new(link))).with_reset_pause(Duration::ZERO);
    (fc, handle)
}

#[test]
fn test_ack_round_trip_through_link() {
    let (mut fc, handle) = flow_controller();
    let parser = GrblResponseParser::new();
    let now = Instant::now();

    assert!(fc.try_send("G0 X10", CommandSource::Job, now).unwrap());
    handle.push_line("ok");

    let batch = fc.poll(now).unwrap();
    let responses: Vec<_> = batch.lines.iter().filter_map(|l| parser.parse(l)).collect();
    assert_eq!(responses, vec![ControllerResponse::Ack]);

    let completed = fc.on_ack().unwrap();
    assert_eq!(completed.text, "G0 X10");
    assert!(fc.try_send("G0 X20", CommandSource::Job, now).unwrap());
    assert_eq!(handle.written_lines(), vec!["G0 X10", "G0 X20"]);
}

#[test]
fn test_trailing_terminator_is_normalised() {
    let (mut fc, handle) = flow_controller();
    fc.try_send("$H\r\n", CommandSource::Job, Instant::now()).unwrap();
    assert_eq!(handle.written(), b"$H\n");
    assert_eq!(fc.pending().unwrap().text, "$H");
}

#[test]
fn test_release_frees_slot() {
    let (mut fc, _handle) = flow_controller();
    let now = Instant::now();

    fc.try_send("G1 X1", CommandSource::Interactive, now).unwrap();
    let released = fc.release("alarm").unwrap();
    assert_eq!(released.source, CommandSource::Interactive);
    assert!(fc.try_send("G1 X2", CommandSource::Job, now).unwrap());
}

#[test]
fn test_realtime_while_waiting() {
    let (mut fc, handle) = flow_controller();
    fc.try_send("G1 X1 F100", CommandSource::Job, Instant::now())
        .unwrap();
    fc.send_realtime(RealtimeCommand::StatusQuery).unwrap();
    fc.send_realtime_bytes(&[0x85]).unwrap();
    assert_eq!(handle.written(), b"G1 X1 F100\n?\x85");
}

#[derive(Debug, Clone)]
enum Op {
    Send(bool),
    Ack,
    Release,
    Reset,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<bool>().prop_map(Op::Send),
        Just(Op::Ack),
        Just(Op::Release),
        Just(Op::Reset),
    ]
}

proptest! {
    #[test]
    fn prop_at_most_one_command_in_flight(ops in proptest::collection::vec(op_strategy(), 1..64)) {
        let (mut fc, handle) = flow_controller();
        let now = Instant::now();
        let mut in_flight = 0usize;
        let mut lines_written = 0usize;

        for (i, op) in ops.into_iter().enumerate() {
            match op {
                Op::Send(job) => {
                    let source = if job { CommandSource::Job } else { CommandSource::Interactive };
                    let sent = fc.try_send(&format!("G0 X{}", i), source, now).unwrap();
                    prop_assert_eq!(sent, in_flight == 0);
                    if sent {
                        in_flight = 1;
                        lines_written += 1;
                    }
                }
                Op::Ack => {
                    prop_assert_eq!(fc.on_ack().is_some(), in_flight == 1);
                    in_flight = 0;
                }
                Op::Release => {
                    fc.release("test");
                    in_flight = 0;
                }
                Op::Reset => {
                    fc.hard_reset().unwrap();
                    in_flight = 0;
                }
            }
            prop_assert_eq!(fc.is_awaiting_ack(), in_flight == 1);
        }

        prop_assert_eq!(handle.written_lines().len(), lines_written);
    }
}
