//! 日志与状态页使用的字节量/速度格式化

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    B,
    KB,
    MB,
    GB,
    TB,
}

impl Unit {
    const ALL: [Unit; 5] = [Unit::B, Unit::KB, Unit::MB, Unit::GB, Unit::TB];

    fn shift(self) -> i32 {
        match self {
            Unit::B => 0,
            Unit::KB => 10,
            Unit::MB => 20,
            Unit::GB => 30,
            Unit::TB => 40,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Unit::B => "B",
            Unit::KB => "KB",
            Unit::MB => "MB",
            Unit::GB => "GB",
            Unit::TB => "TB",
        })
    }
}

/// 以 1024 为进制缩放后的字节量，保留符号
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bytes {
    value: f64,
    unit: Unit,
}

impl Bytes {
    pub fn new(bytes: f64) -> Self {
        let magnitude = bytes.abs();
        let unit = Unit::ALL
            .into_iter()
            .rev()
            .find(|unit| magnitude >= 2f64.powi(unit.shift()))
            .unwrap_or(Unit::B);
        Self {
            value: bytes / 2f64.powi(unit.shift()),
            unit,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }
}

impl fmt::Display for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", self.value, self.unit)
    }
}

/// 传输速度（字节/秒）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rate(pub f64);

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/s", Bytes::new(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    const TB: f64 = GB * 1024.0;

    #[test]
    fn test_scaling() {
        // (bytes, value, unit)
        let cases: &[(f64, f64, Unit)] = &[
            (0.0, 0.0, Unit::B),
            (512.0, 512.0, Unit::B),
            (KB - 1.0, 1023.0, Unit::B),
            (KB, 1.0, Unit::KB),
            (1536.0, 1.5, Unit::KB),
            (MB, 1.0, Unit::MB),
            (3.0 * GB, 3.0, Unit::GB),
            (2048.0 * TB, 2048.0, Unit::TB),
            (-2.0 * KB, -2.0, Unit::KB),
        ];
        for &(bytes, value, unit) in cases {
            let b = Bytes::new(bytes);
            assert_eq!(b.unit(), unit, "unit for {bytes}");
            assert!((b.value() - value).abs() < 1e-9, "value for {bytes}");
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Bytes::new(1536.0).to_string(), "1.50 KB");
        assert_eq!(Bytes::new(10.0).to_string(), "10.00 B");
        assert_eq!(Rate(50.0 * KB).to_string(), "50.00 KB/s");
        assert_eq!(Rate(0.0).to_string(), "0.00 B/s");
    }
}
