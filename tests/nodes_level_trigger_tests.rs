use iqcapture::core::{ProcessingNode, SampleFrame, SharedFlag};
use iqcapture::nodes::{LevelTrigger, TriggerEvent};
use num_complex::Complex32;

fn frame_with_powers(powers: &[f32]) -> SampleFrame {
    let samples = powers.iter().map(|p| Complex32::new(p.sqrt(), 0.0)).collect();
    SampleFrame::scalar(0, 0, samples)
}

#[tokio::test]
async fn test_trigger_passes_frames_through() {
    let mut trigger = LevelTrigger::new(10.0, SharedFlag::anonymous().unwrap());
    let input = frame_with_powers(&[1.0, 50.0, 2.0]);

    let output = trigger.process(input.clone()).await.unwrap().unwrap();
    assert_eq!(output.samples, input.samples);
    assert_eq!(output.sequence_id, input.sequence_id);
}

#[tokio::test]
async fn test_armed_trigger_fires_once_and_disarms() {
    let mut trigger = LevelTrigger::new(10.0, SharedFlag::anonymous().unwrap());
    let mut events = trigger.subscribe(8);
    trigger.arm();

    trigger.process(frame_with_powers(&[2.0, 4.0, 8.0, 15.0, 3.0])).await.unwrap();

    assert_eq!(events.try_recv().unwrap(), TriggerEvent::Start);
    assert!(events.try_recv().is_err());
    assert!(!trigger.is_armed());
}

#[tokio::test]
async fn test_several_crossings_in_one_call_fire_once() {
    let mut trigger = LevelTrigger::new(10.0, SharedFlag::anonymous().unwrap());
    let mut first = trigger.subscribe(8);
    let mut second = trigger.subscribe(8);
    trigger.arm();

    trigger.process(frame_with_powers(&[20.0, 30.0, 40.0])).await.unwrap();

    for events in [&mut first, &mut second] {
        assert_eq!(events.try_recv().unwrap(), TriggerEvent::Start);
        assert!(events.try_recv().is_err());
    }
    assert!(!trigger.is_armed());
}

#[tokio::test]
async fn test_disarmed_trigger_never_fires() {
    let mut trigger = LevelTrigger::new(10.0, SharedFlag::anonymous().unwrap());
    let mut events = trigger.subscribe(8);

    trigger.process(frame_with_powers(&[100.0, 200.0])).await.unwrap();
    trigger.process(frame_with_powers(&[300.0])).await.unwrap();

    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_arm_lasts_one_call_without_crossing() {
    let mut trigger = LevelTrigger::new(10.0, SharedFlag::anonymous().unwrap());
    let mut events = trigger.subscribe(8);
    trigger.arm();

    trigger.process(frame_with_powers(&[1.0, 2.0])).await.unwrap();
    assert!(!trigger.is_armed());

    trigger.process(frame_with_powers(&[500.0])).await.unwrap();
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_power_equal_to_level_does_not_fire() {
    let mut trigger = LevelTrigger::new(4.0, SharedFlag::anonymous().unwrap());
    let mut events = trigger.subscribe(8);
    trigger.arm();

    trigger
        .process(SampleFrame::scalar(
            0,
            0,
            vec![Complex32::new(2.0, 0.0), Complex32::new(0.0, -2.0)],
        ))
        .await
        .unwrap();

    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_power_uses_first_value_of_vector_items() {
    let mut trigger = LevelTrigger::new(10.0, SharedFlag::anonymous().unwrap());
    let mut events = trigger.subscribe(8);
    trigger.arm();

    // Only the second value of each item is loud
    let samples = vec![
        Complex32::new(1.0, 0.0),
        Complex32::new(100.0, 0.0),
        Complex32::new(1.0, 0.0),
        Complex32::new(100.0, 0.0),
    ];
    trigger.process(SampleFrame::new(0, 0, 2, samples)).await.unwrap();

    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_armed_through_shared_flag() {
    let armed = SharedFlag::anonymous().unwrap();
    let mut trigger = LevelTrigger::new(10.0, armed.clone());
    let mut events = trigger.subscribe(8);

    armed.set();
    trigger.process(frame_with_powers(&[11.0])).await.unwrap();

    assert_eq!(events.try_recv().unwrap(), TriggerEvent::Start);
    assert!(!armed.is_set());
}

#[tokio::test]
async fn test_closed_listener_is_dropped() {
    let mut trigger = LevelTrigger::new(10.0, SharedFlag::anonymous().unwrap());
    let dropped = trigger.subscribe(1);
    let mut kept = trigger.subscribe(1);
    drop(dropped);

    trigger.arm();
    trigger.process(frame_with_powers(&[20.0])).await.unwrap();
    assert_eq!(kept.try_recv().unwrap(), TriggerEvent::Start);

    trigger.arm();
    trigger.process(frame_with_powers(&[20.0])).await.unwrap();
    assert_eq!(kept.try_recv().unwrap(), TriggerEvent::Start);
}
