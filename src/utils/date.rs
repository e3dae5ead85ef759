//! UTC datetime utilities without timezone dependencies.
//!
//! Provides a lightweight `DateTimeUtc` struct for HTTP date handling:
//! RFC 1123 formatting for `Last-Modified`, parsing for conditional
//! request headers, and epoch conversion for filesystem mtimes.

use std::time::{SystemTime, UNIX_EPOCH};

/// UTC datetime without timezone complexity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTimeUtc {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

impl DateTimeUtc {
    pub const fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    /// Convert a unix epoch (seconds) into a civil UTC datetime.
    pub fn from_unix(epoch: u64) -> Self {
        let days = (epoch / 86_400) as i64;
        let rem = epoch % 86_400;
        let (year, month, day) = civil_from_days(days);
        Self {
            year: year as u16,
            month: month as u8,
            day: day as u8,
            hour: (rem / 3600) as u8,
            minute: (rem % 3600 / 60) as u8,
            second: (rem % 60) as u8,
        }
    }

    /// Convert back to a unix epoch (seconds). Dates before 1970 clamp to 0.
    pub fn to_unix(self) -> u64 {
        let days = days_from_civil(
            i64::from(self.year),
            u32::from(self.month),
            u32::from(self.day),
        );
        let secs = days * 86_400
            + i64::from(self.hour) * 3600
            + i64::from(self.minute) * 60
            + i64::from(self.second);
        secs.max(0) as u64
    }

    /// Format as an RFC 1123 HTTP date: `Sun, 06 Nov 1994 08:49:37 GMT`
    pub fn to_http_date(self) -> String {
        const WEEKDAYS: [&str; 7] = ["Sat", "Sun", "Mon", "Tue", "Wed", "Thu", "Fri"];

        // Zeller's congruence for weekday calculation
        let weekday = self.weekday_index();

        format!(
            "{}, {:02} {} {:04} {:02}:{:02}:{:02} GMT",
            WEEKDAYS[weekday],
            self.day,
            MONTHS[(self.month - 1) as usize],
            self.year,
            self.hour,
            self.minute,
            self.second
        )
    }

    /// Parse an RFC 1123 HTTP date (`Sun, 06 Nov 1994 08:49:37 GMT`).
    ///
    /// Returns `None` for anything malformed; the weekday prefix is not
    /// cross-checked against the date.
    pub fn parse_http_date(s: &str) -> Option<Self> {
        let rest = s.trim();
        let rest = rest.split_once(", ").map_or(rest, |(_, r)| r);
        let mut parts = rest.split_ascii_whitespace();

        let day = parts.next()?.parse::<u8>().ok()?;
        let month_name = parts.next()?;
        let month = MONTHS.iter().position(|m| *m == month_name)? as u8 + 1;
        let year = parts.next()?.parse::<u16>().ok()?;

        let time = parts.next()?;
        let mut hms = time.split(':');
        let hour = hms.next()?.parse::<u8>().ok()?;
        let minute = hms.next()?.parse::<u8>().ok()?;
        let second = hms.next()?.parse::<u8>().ok()?;

        if parts.next()? != "GMT" {
            return None;
        }

        let dt = Self::new(year, month, day, hour, minute, second);
        dt.is_valid().then_some(dt)
    }

    fn is_valid(self) -> bool {
        (1..=12).contains(&self.month)
            && self.day >= 1
            && self.day <= Self::days_in_month(self.year, self.month)
            && self.hour <= 23
            && self.minute <= 59
            && self.second <= 59
    }

    #[inline]
    #[allow(clippy::manual_is_multiple_of)] // Manual impl for const fn
    const fn is_leap_year(year: u16) -> bool {
        year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
    }

    #[inline]
    const fn days_in_month(year: u16, month: u8) -> u8 {
        match month {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            2 if Self::is_leap_year(year) => 29,
            2 => 28,
            _ => 0,
        }
    }

    #[inline]
    #[allow(clippy::cast_sign_loss)] // Result of % 7 is always 0-6
    fn weekday_index(self) -> usize {
        let (y, m) = if self.month < 3 {
            (i32::from(self.year) - 1, i32::from(self.month) + 12)
        } else {
            (i32::from(self.year), i32::from(self.month))
        };
        let d = i32::from(self.day);
        ((d + (13 * (m + 1)) / 5 + y + y / 4 - y / 100 + y / 400) % 7) as usize
    }
}

/// Format a unix epoch as an RFC 1123 HTTP date.
pub fn http_date(epoch: u64) -> String {
    DateTimeUtc::from_unix(epoch).to_http_date()
}

/// Parse an RFC 1123 HTTP date into a unix epoch.
pub fn parse_http_date(s: &str) -> Option<u64> {
    DateTimeUtc::parse_http_date(s).map(DateTimeUtc::to_unix)
}

/// Current unix epoch in seconds.
pub fn epoch_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Modification time of a file as a unix epoch, `None` if unreadable.
pub fn mtime_epoch(path: &std::path::Path) -> Option<u64> {
    let modified = path.metadata().and_then(|m| m.modified()).ok()?;
    modified.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}

// Days <-> civil date, Howard Hinnant's algorithms.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

fn days_from_civil(y: i64, m: u32, d: u32) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = i64::from(if m > 2 { m - 3 } else { m + 9 });
    let doy = (153 * mp + 2) / 5 + i64::from(d) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}
