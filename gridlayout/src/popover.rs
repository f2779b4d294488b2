//! Card settings draft behind the per-card settings popover.
//!
//! The draft mirrors the card's current size while allowing free-form numeric
//! entry; every edit yields a [`SettingsIntent`] that the board session applies
//! through [`crate::session::BoardSession::apply_settings_intent`].

#[cfg(test)]
#[path = "popover_test.rs"]
mod tests;

/// Approximate pixel width of one grid column shown next to the entry fields.
pub const APPROX_COLUMN_PX: u32 = 100;

/// Change requested from the settings popover.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingsIntent {
    Resize { w: u32, h: u32 },
    RatioLock { locked: bool, ratio: f64 },
    LockInPlace { locked: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CardSettingsDraft {
    width: u32,
    height: u32,
    ratio: f64,
    ratio_locked: bool,
    locked_in_place: bool,
}

impl CardSettingsDraft {
    /// Open a draft for a card. `ratio` is the locked ratio when one exists.
    #[must_use]
    pub fn new(width: u32, height: u32, ratio_locked: bool, ratio: Option<f64>, locked_in_place: bool) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            ratio: ratio.filter(|r| r.is_finite() && *r > 0.0).unwrap_or_else(|| ratio_of(width, height)),
            ratio_locked,
            locked_in_place,
        }
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    #[must_use]
    pub fn is_ratio_locked(&self) -> bool {
        self.ratio_locked
    }

    #[must_use]
    pub fn is_locked_in_place(&self) -> bool {
        self.locked_in_place
    }

    /// Follow an external size change (drag-resize). The ratio tracks the new
    /// size only while unlocked.
    pub fn sync_props(&mut self, width: u32, height: u32, ratio_locked: bool) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.ratio_locked = ratio_locked;
        if !ratio_locked {
            self.ratio = ratio_of(self.width, self.height);
        }
    }

    /// Apply typed width text.
    pub fn enter_width(&mut self, raw: &str) -> SettingsIntent {
        let width = parse_dimension(raw);
        self.width = width;
        if self.ratio_locked {
            self.height = scaled(f64::from(width) / self.ratio);
        } else {
            self.ratio = ratio_of(width, self.height);
        }
        SettingsIntent::Resize { w: self.width, h: self.height }
    }

    /// Apply typed height text.
    pub fn enter_height(&mut self, raw: &str) -> SettingsIntent {
        let height = parse_dimension(raw);
        self.height = height;
        if self.ratio_locked {
            self.width = scaled(f64::from(height) * self.ratio);
        } else {
            self.ratio = ratio_of(self.width, height);
        }
        SettingsIntent::Resize { w: self.width, h: self.height }
    }

    /// Flip the ratio lock, capturing the current proportion.
    pub fn toggle_ratio_lock(&mut self) -> SettingsIntent {
        let ratio = ratio_of(self.width, self.height);
        self.ratio_locked = !self.ratio_locked;
        if self.ratio_locked {
            self.ratio = ratio;
        }
        SettingsIntent::RatioLock { locked: self.ratio_locked, ratio }
    }

    pub fn toggle_lock_in_place(&mut self) -> SettingsIntent {
        self.locked_in_place = !self.locked_in_place;
        SettingsIntent::LockInPlace { locked: self.locked_in_place }
    }

    /// Approximate rendered size in pixels.
    #[must_use]
    pub fn pixel_size(&self, row_height: u32) -> (u32, u32) {
        (
            self.width.saturating_mul(APPROX_COLUMN_PX),
            self.height.saturating_mul(row_height),
        )
    }
}

/// Leading-integer parse of user input. Anything below 1 (or no digits) is 1.
#[must_use]
pub fn parse_dimension(raw: &str) -> u32 {
    let trimmed = raw.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let end = digits.find(|c: char| !c.is_ascii_digit()).unwrap_or(digits.len());
    let digits = &digits[..end];

    if negative || digits.is_empty() {
        return 1;
    }
    digits.parse::<u32>().unwrap_or(u32::MAX).max(1)
}

fn ratio_of(width: u32, height: u32) -> f64 {
    f64::from(width) / f64::from(height.max(1))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled(value: f64) -> u32 {
    if !value.is_finite() {
        return 1;
    }
    value.round().clamp(1.0, f64::from(u32::MAX)) as u32
}
