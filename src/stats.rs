// src/stats.rs

use chrono::{DateTime, NaiveDate, Timelike};
use chrono_tz::Tz;
use serde::Serialize;
use statrs::statistics::Statistics;

use crate::price_record::PriceRecord;
use crate::time_window::FetchWindow;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HourPrice {
    pub hour: u8,
    pub price: f64,
}

/// Per-day summary handed to reporting.
///
/// `date` and the hours in `cheapest` / `most_expensive` share one calendar:
/// UTC for [`DailyStats::from_records`], the market timezone for
/// [`DailyStats::for_window`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub hours: usize,
    pub average: f64,
    pub cheapest: HourPrice,
    pub most_expensive: HourPrice,
    pub unit: String,
}

impl DailyStats {
    /// Summarises the records of one UTC day. Ties go to the earliest hour.
    ///
    /// Returns `None` for an empty slice.
    pub fn from_records(records: &[PriceRecord]) -> Option<Self> {
        let date = records.first()?.date;
        let slots: Vec<(u8, &PriceRecord)> = records.iter().map(|r| (r.hour, r)).collect();
        Self::summarise(date, &slots)
    }

    /// Summarises the slots of a market-local day window, reporting hours as
    /// wall-clock hours in `tz`. Records outside the window are ignored.
    pub fn for_window(window: &FetchWindow, tz: Tz, records: &[PriceRecord]) -> Option<Self> {
        let mut slots: Vec<(i64, u8, &PriceRecord)> = records
            .iter()
            .filter_map(|record| {
                let start_ms = record.slot_start_ms()?;
                let local = DateTime::from_timestamp_millis(start_ms)?.with_timezone(&tz);
                Some((start_ms, local.hour() as u8, record))
            })
            .filter(|(start_ms, _, _)| window.contains_ms(*start_ms))
            .collect();
        slots.sort_by_key(|(start_ms, _, _)| *start_ms);

        let slots: Vec<(u8, &PriceRecord)> = slots.into_iter().map(|(_, hour, r)| (hour, r)).collect();
        Self::summarise(window.day, &slots)
    }

    fn summarise(date: NaiveDate, slots: &[(u8, &PriceRecord)]) -> Option<Self> {
        let (first_hour, first) = *slots.first()?;

        let mut cheapest = HourPrice { hour: first_hour, price: first.price };
        let mut most_expensive = cheapest;
        for (hour, record) in &slots[1..] {
            if record.price < cheapest.price {
                cheapest = HourPrice { hour: *hour, price: record.price };
            }
            if record.price > most_expensive.price {
                most_expensive = HourPrice { hour: *hour, price: record.price };
            }
        }

        let prices: Vec<f64> = slots.iter().map(|(_, r)| r.price).collect();

        Some(DailyStats {
            date,
            hours: slots.len(),
            average: prices.iter().mean(),
            cheapest,
            most_expensive,
            unit: first.unit.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarises_a_day() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();
        let records: Vec<PriceRecord> = [30.0, 10.0, 50.0, 10.0, 50.0, 30.0]
            .iter()
            .enumerate()
            .map(|(hour, price)| PriceRecord::new(date, hour as u8, *price, "Eur/MWh"))
            .collect();

        let stats = DailyStats::from_records(&records).unwrap();
        assert_eq!(stats.hours, 6);
        assert!((stats.average - 30.0).abs() < 1e-9);
        assert_eq!(stats.cheapest, HourPrice { hour: 1, price: 10.0 });
        assert_eq!(stats.most_expensive, HourPrice { hour: 2, price: 50.0 });
        assert_eq!(stats.unit, "Eur/MWh");
    }

    #[test]
    fn empty_day_has_no_stats() {
        assert!(DailyStats::from_records(&[]).is_none());
    }

    #[test]
    fn window_stats_use_local_hours() {
        // Local 2024-03-11 in Vienna (CET) starts at 2024-03-10T23:00Z.
        let utc_10 = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let utc_11 = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();
        let mut records = vec![PriceRecord::new(utc_10, 22, 1.0, "Eur/MWh"), PriceRecord::new(utc_10, 23, 10.0, "Eur/MWh")];
        records.extend((0..23).map(|hour| PriceRecord::new(utc_11, hour, 11.0 + f64::from(hour), "Eur/MWh")));
        let window = FetchWindow {
            day: utc_11,
            start_ms: 1_710_111_600_000,
            end_ms: 1_710_111_600_000 + 24 * 3_600_000 - 1,
        };

        let stats = DailyStats::for_window(&window, chrono_tz::Europe::Vienna, &records).unwrap();
        assert_eq!(stats.date, utc_11);
        assert_eq!(stats.hours, 24);
        assert_eq!(stats.cheapest, HourPrice { hour: 0, price: 10.0 });
        assert_eq!(stats.most_expensive, HourPrice { hour: 23, price: 33.0 });
    }
}
