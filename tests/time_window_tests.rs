// tests/time_window_tests.rs

mod common;

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Europe::Vienna;
use common::{date, local, windows_at};

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
}

#[test]
fn test_tomorrow_in_utc_market() {
    let windows = windows_at(chrono_tz::UTC, local(2024, 3, 10, 10, 0));

    let window = windows.day(1).unwrap();

    assert_eq!(window.day, date(2024, 3, 11));
    assert_eq!(window.start().unwrap(), utc(2024, 3, 11, 0, 0, 0));
    assert_eq!(window.end_ms, utc(2024, 3, 11, 23, 59, 59).timestamp_millis() + 999);
    assert_eq!(window.start_ms, 1_710_115_200_000);
}

#[test]
fn test_tomorrow_in_vienna_is_shifted_to_utc() {
    let windows = windows_at(Vienna, local(2024, 3, 10, 10, 0));

    let window = windows.day(1).unwrap();

    // CET is UTC+1 in early March.
    assert_eq!(window.day, date(2024, 3, 11));
    assert_eq!(window.start().unwrap(), utc(2024, 3, 10, 23, 0, 0));
    assert_eq!(window.end_ms, utc(2024, 3, 11, 22, 59, 59).timestamp_millis() + 999);
}

#[test]
fn test_yesterday_and_today() {
    let windows = windows_at(chrono_tz::UTC, local(2024, 1, 1, 0, 30));

    let yesterday = windows.day(-1).unwrap();
    let today = windows.day(0).unwrap();

    assert_eq!(yesterday.day, date(2023, 12, 31));
    assert_eq!(yesterday.end_ms + 1, today.start_ms);
    assert_eq!(today.start().unwrap(), utc(2024, 1, 1, 0, 0, 0));
}

#[test]
fn test_reference_instant_is_read_in_local_time() {
    // 23:30 UTC on the 10th is already the 11th in Vienna.
    let windows = windows_at(Vienna, local(2024, 3, 11, 0, 30));

    assert_eq!(windows.now_local().naive_local(), local(2024, 3, 11, 0, 30));
    assert_eq!(windows.day(0).unwrap().day, date(2024, 3, 11));
    assert_eq!(windows.local_hour(), 0);
}

#[test]
fn test_month_windows() {
    let windows = windows_at(chrono_tz::UTC, local(2024, 6, 1, 12, 0));

    let february = windows.month(2024, 2).unwrap();
    assert_eq!(february.start().unwrap(), utc(2024, 2, 1, 0, 0, 0));
    assert_eq!(february.end().unwrap(), utc(2024, 2, 29, 23, 59, 59) + chrono::TimeDelta::milliseconds(999));

    let december = windows.month(2023, 12).unwrap();
    let january = windows.month(2024, 1).unwrap();
    assert_eq!(december.end_ms + 1, january.start_ms);
}
