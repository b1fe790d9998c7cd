// Copyright 2025 The Calcdown Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Calendar support for date-valued cells: Gregorian civil dates to Unix
//! epoch seconds at UTC midnight.

use crate::common::{Error, ErrorCode, ErrorKind, Result};

const SECONDS_PER_DAY: i64 = 86_400;

pub fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if is_leap_year(year) {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

// civil-from-days inverse by Howard Hinnant's algorithm; days are relative
// to 1970-01-01
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400; // [0, 399]
    let mp = (month as i64 + 9) % 12; // March is month 0
    let doy = (153 * mp + 2) / 5 + day as i64 - 1; // [0, 365]
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy; // [0, 146096]
    era * 146097 + doe - 719_468
}

/// Unix epoch seconds for midnight UTC of the given Gregorian date.
/// The month must be 1..=12 and the day must exist in that month
/// (February 29 only in leap years).
pub fn epoch_seconds(year: i32, month: u32, day: u32) -> Result<i64> {
    if !(1..=12).contains(&month) || day < 1 || day > days_in_month(year, month) {
        return Err(Error::new(
            ErrorKind::Evaluation,
            ErrorCode::BadCalendarDate,
            Some(format!("{year:04}-{month:02}-{day:02}")),
        ));
    }

    Ok(days_from_civil(year as i64, month, day) * SECONDS_PER_DAY)
}
