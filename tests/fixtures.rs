use dsmr2mqtt::metering_p1::meter_definitions::{get_meter_descriptor, MeterFamily};
use dsmr2mqtt::metering_p1::utils::calculate_checksum;
use dsmr2mqtt::{P1Pipeline, PipelineOptions, Telegram, TelegramState};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

struct Expected {
    family: MeterFamily,
    objects: usize,
    values: usize,
    unknown: usize,
}

fn expected(name: &str) -> Expected {
    let (family, objects, values, unknown) = match name {
        "dsmr_22" => (MeterFamily::Dsmr22, 16, 22, 0),
        "dsmr_40" => (MeterFamily::Dsmr40, 23, 25, 0),
        "dsmr_42" => (MeterFamily::Dsmr42, 23, 27, 0),
        "dsmr_50" => (MeterFamily::Dsmr50, 35, 41, 0),
        "smarty" => (MeterFamily::Smarty, 22, 23, 0),
        "flu5" => (MeterFamily::Fluvius, 22, 23, 0),
        "flu5_invalid_gasmeter" => (MeterFamily::Fluvius, 20, 21, 1),
        "easymeter_q3d" => (MeterFamily::EasyMeter, 11, 11, 0),
        "ebz_dd3" => (MeterFamily::Ebz, 18, 18, 0),
        "iskra_am550" => (MeterFamily::Dsmr50, 20, 23, 0),
        "landis_gyr_e350" => (MeterFamily::Dsmr42, 30, 37, 0),
        "landis_gyr_zcf110" => (MeterFamily::Dsmr50, 23, 25, 0),
        "sagemcom_xs210" => (MeterFamily::Dsmr50, 35, 37, 0),
        "smarty_with_units" => (MeterFamily::Smarty, 25, 26, 2),
        "dsmr_50_austria" => (MeterFamily::Dsmr50, 19, 19, 7),
        "ace4000" => (MeterFamily::Dsmr22, 12, 12, 1),
        other => panic!("no expectations for fixture {}", other),
    };
    Expected { family, objects, values, unknown }
}

fn fixtures() -> Vec<PathBuf> {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures");
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.extension().map_or(false, |ext| ext == "telegram"))
        .collect();
    paths.sort();
    paths
}

fn name(path: &Path) -> String {
    path.file_stem().unwrap().to_string_lossy().into_owned()
}

fn parse_chunks<'a>(family: MeterFamily, chunks: impl Iterator<Item = &'a [u8]>) -> Vec<Telegram> {
    let mut pipeline = P1Pipeline::new(get_meter_descriptor(family), PipelineOptions::default());
    let mut telegrams = Vec::new();
    for chunk in chunks {
        pipeline.push(chunk);
        telegrams.extend(pipeline.by_ref().map(|t| t.unwrap()));
    }
    telegrams.extend(pipeline.finish());
    telegrams
}

fn parse_fixture(path: &Path) -> Telegram {
    let bytes = fs::read(path).unwrap();
    let mut telegrams = parse_chunks(expected(&name(path)).family, std::iter::once(bytes.as_slice()));
    assert_eq!(telegrams.len(), 1, "{}", name(path));
    telegrams.remove(0)
}

#[test]
fn all_fixtures_are_present() {
    let names: Vec<String> = fixtures().iter().map(|p| name(p)).collect();
    assert!(names.len() >= 16, "{:?}", names);
    assert!(names.contains(&"dsmr_50".to_string()));
    assert!(names.contains(&"flu5_invalid_gasmeter".to_string()));
}

#[test]
fn checksum_round_trip() {
    for path in fixtures() {
        let bytes = fs::read(&path).unwrap();
        let end = bytes.iter().rposition(|b| *b == b'!').unwrap();
        let field = String::from_utf8_lossy(&bytes[end + 1..]).trim().to_string();
        if field.is_empty() {
            continue;
        }

        let start = bytes.iter().position(|b| *b == b'/').unwrap();
        let crc = calculate_checksum(&bytes[start..=end]);
        assert_eq!(format!("{:04X}", crc), field.to_uppercase(), "{}", name(&path));
        assert_eq!(parse_fixture(&path).state(), TelegramState::Ok, "{}", name(&path));
    }
}

#[test]
fn object_counts() {
    for path in fixtures() {
        let fixture = name(&path);
        let expected = expected(&fixture);
        let telegram = parse_fixture(&path);

        assert_eq!(telegram.state(), TelegramState::Ok, "{}", fixture);
        assert_eq!(telegram.cosem_objects().len(), expected.objects, "{}", fixture);
        assert_eq!(telegram.value_count(), expected.values, "{}", fixture);
        assert_eq!(telegram.unknown_objects().count(), expected.unknown, "{}", fixture);
        assert_eq!(telegram.diagnostics().skipped_lines, 0, "{}", fixture);
    }
}

#[test]
fn dsmr_50_reference() {
    let telegram = parse_fixture(&Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/dsmr_50.telegram"));

    assert_eq!(telegram.value_count(), 41);
    assert_eq!(telegram.unknown_objects().count(), 0);
    assert_eq!(telegram.diagnostics().value_errors, 0);

    let device = telegram.device().unwrap();
    assert_eq!(device.manufacturer, "ISk");
    assert_eq!(device.model, "MT382-1000");

    let voltage = telegram.find(&"1-0:32.7.0".parse().unwrap()).unwrap();
    assert_eq!(voltage.value(0).unwrap().to_string(), "220.1*V");

    let gas = telegram.find_channel("mbus_reading").unwrap();
    assert_eq!(gas.obis().channel(), 1);
    assert_eq!(gas.value(1).unwrap().as_f64(), Some(12785.123));

    let equipment = telegram.find_channel("equipment_id").unwrap();
    assert_eq!(equipment.value(0).unwrap().decode_hex_text().as_deref(), Some("K8EG004046395507"));
}

#[test]
fn flu5_invalid_gasmeter_isolates_the_failure() {
    let telegram = parse_fixture(&Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/flu5_invalid_gasmeter.telegram"));

    assert_eq!(telegram.known_objects().count(), 19);
    assert_eq!(telegram.unknown_objects().count(), 1);

    let unknown = telegram.unknown_objects().next().unwrap();
    assert_eq!(unknown.obis().to_string(), "0-1:24.2.3");
    assert_eq!(unknown.channel(), Some("mbus_reading"));
    assert_eq!(unknown.errors().count(), 1);
    assert_eq!(unknown.valid_values().count(), 1);
    assert!(telegram.known_objects().all(|o| o.errors().count() == 0));
    assert_eq!(telegram.diagnostics().value_errors, 1);
    assert_eq!(telegram.diagnostics().unknown_objects, 1);
}

#[test]
fn dsmr_22_gas_reading_spans_two_lines() {
    let telegram = parse_fixture(&Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/dsmr_22.telegram"));

    let reading = telegram.find_channel("mbus_reading").unwrap();
    assert_eq!(reading.values().len(), 7);
    assert_eq!(reading.value(6).unwrap().to_string(), "00001.001*m3");
}

#[test]
fn fragmentation_does_not_change_the_result() {
    for path in fixtures() {
        let bytes = fs::read(&path).unwrap();
        let family = expected(&name(&path)).family;
        let whole = parse_chunks(family, std::iter::once(bytes.as_slice()));

        for size in [1, 2, 7, 64] {
            let split = parse_chunks(family, bytes.chunks(size));
            assert_eq!(split, whole, "{} in chunks of {}", name(&path), size);
        }
    }
}

#[test]
fn parsing_is_idempotent() {
    for path in fixtures() {
        assert_eq!(parse_fixture(&path), parse_fixture(&path), "{}", name(&path));
    }
}

#[test]
fn back_to_back_telegrams() {
    let mut stream = Vec::new();
    for name in ["dsmr_50", "dsmr_42", "dsmr_50"] {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(format!("tests/fixtures/{}.telegram", name));
        stream.extend(fs::read(path).unwrap());
    }

    let telegrams = parse_chunks(MeterFamily::Dsmr50, stream.chunks(100));
    assert_eq!(telegrams.len(), 3);
    assert!(telegrams.iter().all(|t| t.state() == TelegramState::Ok));
    assert_eq!(telegrams[1].identification(), "KFM5KAIFA-METER");
}

#[test]
fn corrupted_checksum_keeps_the_objects() {
    for path in fixtures() {
        let mut bytes = fs::read(&path).unwrap();
        let end = bytes.iter().rposition(|b| *b == b'!').unwrap();
        if !bytes.get(end + 1).map_or(false, |b| b.is_ascii_hexdigit()) {
            continue;
        }
        bytes[end + 1] = if bytes[end + 1] == b'0' { b'1' } else { b'0' };

        let family = expected(&name(&path)).family;
        let corrupted = parse_chunks(family, std::iter::once(bytes.as_slice()));
        let original = parse_fixture(&path);

        assert_eq!(corrupted[0].state(), TelegramState::ChecksumError, "{}", name(&path));
        assert_eq!(corrupted[0].cosem_objects(), original.cosem_objects(), "{}", name(&path));
    }
}

#[test]
fn stray_start_marker_resyncs() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/dsmr_40.telegram");
    let good = fs::read(&path).unwrap();

    let mut stream = good[..good.len() / 2].to_vec();
    stream.extend_from_slice(b"\r\n");
    stream.extend_from_slice(&good);

    let telegrams = parse_chunks(MeterFamily::Dsmr40, std::iter::once(stream.as_slice()));
    assert_eq!(telegrams.len(), 2);
    assert_eq!(telegrams[0].state(), TelegramState::Invalid);
    assert_eq!(telegrams[1].state(), TelegramState::Ok);
    assert_eq!(telegrams[1].cosem_objects().len(), 23);
}

#[test]
fn noise_byte_before_start_marker_resyncs() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/dsmr_42.telegram");
    let good = fs::read(&path).unwrap();

    let mut stream = good[..good.len() / 3].to_vec();
    stream.extend_from_slice(b"\r\n\x00");
    stream.extend_from_slice(&good);

    let telegrams = parse_chunks(MeterFamily::Dsmr42, stream.chunks(17));
    let states: Vec<TelegramState> = telegrams.iter().map(|t| t.state()).collect();
    assert_eq!(states, vec![TelegramState::Invalid, TelegramState::Ok]);
    assert_eq!(telegrams[1].cosem_objects().len(), 23);
}

#[test]
fn austrian_extensions_are_unknown_under_dsmr_50() {
    let telegram = parse_fixture(&Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/dsmr_50_austria.telegram"));

    let unknown: Vec<String> = telegram.unknown_objects().map(|o| o.obis().to_string()).collect();
    assert_eq!(
        unknown,
        vec!["0-0:42.0.0", "1-0:1.8.0", "1-0:2.8.0", "1-0:3.8.0", "1-0:4.8.0", "1-0:16.7.0", "1-0:13.7.0"]
    );
    assert!(telegram.unknown_objects().all(|o| o.channel().is_none() && o.errors().count() == 0));

    /* best effort values are still there */
    let total = telegram.find(&"1-0:1.8.0".parse().unwrap()).unwrap();
    assert_eq!(total.value(0).unwrap().to_string(), "000512.736*kWh");
    assert_eq!(telegram.diagnostics().unknown_objects, 7);
    assert_eq!(telegram.diagnostics().value_errors, 0);
}

#[test]
fn smarty_reactive_phase_power_is_unknown() {
    let telegram = parse_fixture(&Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/smarty_with_units.telegram"));

    let unknown: Vec<String> = telegram.unknown_objects().map(|o| o.obis().to_string()).collect();
    assert_eq!(unknown, vec!["1-0:23.7.0", "1-0:24.7.0"]);

    let threshold = telegram.find_channel("threshold").unwrap();
    assert_eq!(threshold.value(0).unwrap().to_string(), "03.0*kVA");
    let reactive = telegram.find_channel("reactive_energy_delivered").unwrap();
    assert_eq!(reactive.value(0).unwrap().as_f64(), Some(31.234));
}

#[test]
fn ace4000_without_checksum() {
    let telegram = parse_fixture(&Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/ace4000.telegram"));

    assert_eq!(telegram.state(), TelegramState::Ok);
    assert_eq!(telegram.received_crc(), None);
    assert_eq!(telegram.device().unwrap().manufacturer, "ACE");

    let unknown: Vec<String> = telegram.unknown_objects().map(|o| o.obis().to_string()).collect();
    assert_eq!(unknown, vec!["0-0:96.1.0"]);
    assert_eq!(telegram.find_channel("switch_position").unwrap().value(0).unwrap().as_flags(), Some(1));
}
