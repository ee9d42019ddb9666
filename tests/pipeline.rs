use amua_recorder::capture::hexdump::{format_hexdump, PACKET_LABEL};
use amua_recorder::capture::{
    CaptureMode, ControllerConfig, RecordingController, ReplayTransport, StreamPhase,
    DISCARD_WINDOW,
};
use amua_recorder::command::{self, Context};
use amua_recorder::config::Config;
use amua_recorder::db::MemoryStore;
use amua_recorder::storage::WavHeader;
use std::time::Duration;

fn packet(sequence: u16, first_sample: i16) -> Vec<u8> {
    let mut data = vec![0u8; 243];
    for i in 0..121 {
        let sample = first_sample.wrapping_add(i as i16);
        let offset = 1 + i * 2;
        data[offset..offset + 2].copy_from_slice(&sample.to_le_bytes());
    }
    // The sequence number shares byte 1 with the first sample.
    data[..2].copy_from_slice(&sequence.to_le_bytes());
    data
}

#[tokio::test(start_paused = true)]
async fn three_full_packets_make_a_770_byte_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut controller =
        RecordingController::new(ReplayTransport::default(), ControllerConfig::new(dir.path()));

    controller.start_stream().await.unwrap();
    controller.handle_notification(&packet(0, 0)).await.unwrap();
    tokio::time::advance(DISCARD_WINDOW + Duration::from_millis(10)).await;

    for seq in 1..=3 {
        controller
            .handle_notification(&packet(seq, seq as i16 * 1000))
            .await
            .unwrap();
    }
    let recording = controller.stop_stream().await.unwrap().unwrap();

    assert_eq!(recording.samples, 363);
    assert!(recording.stop_acknowledged);
    assert_eq!(std::fs::metadata(&recording.path).unwrap().len(), 770);

    let header = WavHeader::read_from(&recording.path).unwrap();
    assert_eq!(header.data_len, 726);
    assert_eq!(header.format.sample_rate, 32000);
    assert_eq!(header.format.channels, 1);
    assert_eq!(header.format.bits_per_sample, 16);

    let mut reader = hound::WavReader::open(&recording.path).unwrap();
    assert_eq!(reader.duration(), 363);
    let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    assert_eq!(samples.len(), 363);
    assert_eq!(samples[1], 1001);
    assert_eq!(samples[122], 2001);
    assert_eq!(samples[362], 3120);

    assert!(controller.stop_stream().await.unwrap().is_none());
    assert_eq!(controller.phase(), StreamPhase::Stopped);
}

#[tokio::test]
async fn deleting_the_current_session_yields_a_fresh_one() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.recordings_dir = dir.path().join("recordings");
    config.temp_dir = dir.path().join("tmp");
    let ctx = Context::new(config, MemoryStore::new());

    let current = ctx.sessions.current_session().await.unwrap();
    command::delete_session(&ctx, &current.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2)).await;

    let next = ctx.sessions.current_session().await.unwrap();
    assert_ne!(next.id, current.id);
    assert_eq!(ctx.sessions.list_sessions().await.unwrap(), vec![next]);
}

#[tokio::test]
async fn replayed_log_lands_in_the_current_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.recordings_dir = dir.path().join("recordings");
    config.temp_dir = dir.path().join("tmp");
    let ctx = Context::new(config, MemoryStore::new());

    let mut log = String::new();
    for seq in [100u16, 101, 103] {
        log.push_str("[record] 2025-06-01 09:00:00 - INFO: ");
        log.push_str(&format_hexdump(PACKET_LABEL, &packet(seq, 0)));
        log.push('\n');
    }
    log.push_str("[record] 2025-06-01 09:00:01 - INFO: Audio Packet: \n");
    log.push_str(&format!("{}0a 00 |\n", " ".repeat(40)));
    let log_path = dir.path().join("bench.log");
    std::fs::write(&log_path, log).unwrap();

    for (mode, name) in [(CaptureMode::Streaming, "streamed"), (CaptureMode::Buffered, "buffered")] {
        let entry = command::replay(&ctx, &log_path, Some(name), mode).await.unwrap();
        assert_eq!(entry.name, name);
        assert_eq!(entry.samples, Some(363));
        assert_eq!(entry.size_bytes, 770);
    }

    let current = ctx.sessions.current_session().await.unwrap();
    let recordings = command::list_recordings(&ctx, Some(&current.id)).await.unwrap();
    assert_eq!(recordings.len(), 2);
    assert!(std::fs::read_dir(dir.path().join("tmp")).unwrap().next().is_none());
}

#[tokio::test]
async fn failed_import_reports_where_the_capture_was_left() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.recordings_dir = dir.path().join("recordings");
    config.temp_dir = dir.path().join("tmp");
    let ctx = Context::new(config, MemoryStore::new());

    let log_path = dir.path().join("short.log");
    std::fs::write(&log_path, format_hexdump(PACKET_LABEL, &packet(7, 0))).unwrap();

    let err = command::replay(&ctx, &log_path, Some("../outside"), CaptureMode::Streaming)
        .await
        .unwrap_err();

    let left: Vec<_> = std::fs::read_dir(dir.path().join("tmp"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(left.len(), 1);
    assert!(err.to_string().contains(&left[0].display().to_string()));
    assert_eq!(std::fs::metadata(&left[0]).unwrap().len(), 44 + 242);
}
