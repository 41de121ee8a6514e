// These tests time real cache accesses, so their assertions are statistical.

use cache_side_channel::table_side_channel::recover_byte;
use cache_utils::mmap::MMappedMemory;
use cache_side_channel::CacheStatus;
use flush_reload::{
    classify, flush_all, hot_after_flush, leak_secret, probe_all, select_min,
    NaiveFlushAndReload, SlotRegion, DEFAULT_STRIDE,
};
use std::io::Write;

fn anonymous_region() -> SlotRegion {
    let memory = MMappedMemory::anonymous(256 * DEFAULT_STRIDE, |i| (i / DEFAULT_STRIDE) as u8)
        .unwrap();
    SlotRegion::new(memory, 0, DEFAULT_STRIDE).unwrap()
}

#[test]
fn flushed_slots_all_read_cold() {
    let region = anonymous_region();
    let calibration = region.calibrate(0, 10_000);

    let mut hot = 0;
    let mut total = 0;
    for _ in 0..20 {
        flush_all(&region);
        for sample in probe_all(&region).iter() {
            total += 1;
            if classify(&calibration.threshold, sample.cycles) == CacheStatus::Hit {
                hot += 1;
            }
        }
    }
    assert!(hot_after_flush(&region, &calibration.threshold) < 256 / 10);
    assert!(
        hot * 50 < total,
        "{} of {} flushed slots looked cached (threshold {} cycles)",
        hot,
        total,
        calibration.threshold.value
    );
}

#[test]
fn warmed_slot_is_the_fastest() {
    const REPETITIONS: u32 = 100;
    let region = anonymous_region();
    let mut success = [0u32; 256];
    for slot in 0..=255u8 {
        for _ in 0..REPETITIONS {
            flush_all(&region);
            region.touch(slot);
            if select_min(&probe_all(&region)) == slot {
                success[slot as usize] += 1;
            }
        }
    }
    for (slot, &ok) in success.iter().enumerate() {
        assert!(
            ok * 10 >= REPETITIONS * 9,
            "warmed slot {} found in only {} of {} trials",
            slot,
            ok,
            REPETITIONS
        );
    }
}

#[test]
fn vote_recovers_every_warmed_value() {
    let region = anonymous_region();
    let mut oracle = NaiveFlushAndReload::new(&region);
    for k in 0..=255u8 {
        let mut victim = |_: usize| region.touch(k);
        let vote = recover_byte(&mut oracle, &mut victim, 0, 10).unwrap();
        assert_eq!(vote.value, k, "{:?}", vote);
    }
}

#[test]
fn scan_hello() {
    let region = anonymous_region();
    let secret = [72u8, 101, 108, 108, 111];
    let mut victim = |position: usize| region.touch(secret[position]);
    let recovered = leak_secret(&region, &mut victim, 0, secret.len(), 10).unwrap();
    assert_eq!(recovered.as_bytes(), &secret);
    assert_eq!(recovered.to_string(), "Hello");
}

#[test]
fn scan_multiples_of_seven() {
    let region = anonymous_region();
    let mut victim = |position: usize| region.touch((position * 7 % 256) as u8);
    let recovered = leak_secret(&region, &mut victim, 0, 5, 10).unwrap();
    assert_eq!(recovered.as_bytes(), &[0, 7, 14, 21, 28]);
}

#[test]
fn scan_through_file_mapping() {
    let offset = 0x2020;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let mut contents = vec![0xccu8; offset + 256 * DEFAULT_STRIDE];
    for slot in 0..256 {
        contents[offset + slot * DEFAULT_STRIDE] = slot as u8;
    }
    file.write_all(&contents).unwrap();
    file.flush().unwrap();

    let memory = MMappedMemory::map_file(file.path(), contents.len()).unwrap();
    let region = SlotRegion::new(memory, offset, DEFAULT_STRIDE).unwrap();
    assert_eq!(region.read_slot(200), 200);

    let flag = b"FLAG{";
    let mut victim = |position: usize| region.touch(flag[position - 48]);
    let recovered = leak_secret(&region, &mut victim, 48, flag.len(), 10).unwrap();
    assert_eq!(recovered.as_bytes(), flag);
}
