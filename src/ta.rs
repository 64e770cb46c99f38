//! Technical-indicator math.
//!
//! Pure, allocation-light functions over close series and bars. Used by the
//! technical/risk agents and by the FinanceQL builtin library. Rolling
//! outputs are tail-aligned: the first element corresponds to the first bar
//! with a full lookback window, so output length is input length minus the
//! warmup. Inputs shorter than the warmup return an empty vector; scalar
//! helpers return 0.0 on insufficient data rather than failing.

use crate::data::Bar;

/// Simple moving average, one value per full window.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(values.len() - period + 1);
    let mut sum: f64 = values[..period].iter().sum();
    out.push(sum / period as f64);
    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out.push(sum / period as f64);
    }
    out
}

/// Exponential moving average seeded with the SMA of the first window.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    let k = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len() - period + 1);
    let seed: f64 = values[..period].iter().sum::<f64>() / period as f64;
    out.push(seed);
    let mut prev = seed;
    for &v in &values[period..] {
        prev = (v - prev) * k + prev;
        out.push(prev);
    }
    out
}

/// Relative strength index with Wilder smoothing. First value covers the
/// first `period` deltas, so output length is `len - period`.
pub fn rsi(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() <= period {
        return Vec::new();
    }
    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in 1..=period {
        let delta = values[i] - values[i - 1];
        if delta > 0.0 {
            gains += delta;
        } else {
            losses -= delta;
        }
    }
    let mut avg_gain = gains / period as f64;
    let mut avg_loss = losses / period as f64;
    let mut out = Vec::with_capacity(values.len() - period);
    out.push(rsi_point(avg_gain, avg_loss));

    for i in period + 1..values.len() {
        let delta = values[i] - values[i - 1];
        let (gain, loss) = if delta > 0.0 { (delta, 0.0) } else { (0.0, -delta) };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        out.push(rsi_point(avg_gain, avg_loss));
    }
    out
}

fn rsi_point(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
}

/// MACD line, signal line and histogram, mutually tail-aligned.
pub fn macd(
    values: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let fast_ema = ema(values, fast);
    let slow_ema = ema(values, slow);
    if slow_ema.is_empty() || fast_ema.len() < slow_ema.len() {
        return (Vec::new(), Vec::new(), Vec::new());
    }
    let offset = fast_ema.len() - slow_ema.len();
    let line: Vec<f64> = slow_ema
        .iter()
        .enumerate()
        .map(|(i, s)| fast_ema[offset + i] - s)
        .collect();
    let signal_line = ema(&line, signal);
    let histogram: Vec<f64> = if signal_line.is_empty() {
        Vec::new()
    } else {
        let offset = line.len() - signal_line.len();
        signal_line
            .iter()
            .enumerate()
            .map(|(i, s)| line[offset + i] - s)
            .collect()
    };
    (line, signal_line, histogram)
}

/// Bollinger bands: (middle, upper, lower), tail-aligned with `sma`.
pub fn bollinger(values: &[f64], period: usize, k: f64) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let middle = sma(values, period);
    if middle.is_empty() {
        return (Vec::new(), Vec::new(), Vec::new());
    }
    let mut upper = Vec::with_capacity(middle.len());
    let mut lower = Vec::with_capacity(middle.len());
    for (i, &m) in middle.iter().enumerate() {
        let window = &values[i..i + period];
        let sd = stddev(window);
        upper.push(m + k * sd);
        lower.push(m - k * sd);
    }
    (middle, upper, lower)
}

/// Population standard deviation.
pub fn stddev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Average true range with Wilder smoothing; output length `len - period`.
pub fn atr(bars: &[Bar], period: usize) -> Vec<f64> {
    if period == 0 || bars.len() <= period {
        return Vec::new();
    }
    let trs: Vec<f64> = bars
        .windows(2)
        .map(|w| w[1].true_range(w[0].close))
        .collect();
    let mut out = Vec::with_capacity(trs.len() - period + 1);
    let mut prev = trs[..period].iter().sum::<f64>() / period as f64;
    out.push(prev);
    for &tr in &trs[period..] {
        prev = (prev * (period as f64 - 1.0) + tr) / period as f64;
        out.push(prev);
    }
    out
}

/// Volume-weighted average price over the whole slice.
pub fn vwap(bars: &[Bar]) -> f64 {
    let mut pv = 0.0;
    let mut volume = 0.0;
    for bar in bars {
        let typical = (bar.high + bar.low + bar.close) / 3.0;
        pv += typical * bar.volume as f64;
        volume += bar.volume as f64;
    }
    if volume == 0.0 {
        0.0
    } else {
        pv / volume
    }
}

/// SuperTrend line and direction (+1 up, -1 down), tail-aligned with `atr`.
pub fn supertrend(bars: &[Bar], period: usize, multiplier: f64) -> (Vec<f64>, Vec<i8>) {
    let atr_values = atr(bars, period);
    if atr_values.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let offset = bars.len() - atr_values.len();
    let mut line = Vec::with_capacity(atr_values.len());
    let mut direction = Vec::with_capacity(atr_values.len());

    let mut upper_band = 0.0;
    let mut lower_band = 0.0;
    let mut dir: i8 = 1;

    for (i, &a) in atr_values.iter().enumerate() {
        let bar = &bars[offset + i];
        let hl2 = (bar.high + bar.low) / 2.0;
        let basic_upper = hl2 + multiplier * a;
        let basic_lower = hl2 - multiplier * a;

        if i == 0 {
            upper_band = basic_upper;
            lower_band = basic_lower;
        } else {
            let prev_close = bars[offset + i - 1].close;
            upper_band = if basic_upper < upper_band || prev_close > upper_band {
                basic_upper
            } else {
                upper_band
            };
            lower_band = if basic_lower > lower_band || prev_close < lower_band {
                basic_lower
            } else {
                lower_band
            };
        }

        dir = if bar.close > upper_band {
            1
        } else if bar.close < lower_band {
            -1
        } else {
            dir
        };
        line.push(if dir == 1 { lower_band } else { upper_band });
        direction.push(dir);
    }
    (line, direction)
}

/// Interpolated percentile (p in 0..=100) over a copy of the data.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let frac = rank - lo as f64;
        sorted[lo] * (1.0 - frac) + sorted[hi] * frac
    }
}

/// Pearson correlation over the overlapping tail of two series.
pub fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let a = &a[a.len() - n..];
    let b = &b[b.len() - n..];
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return 0.0;
    }
    cov / (var_a.sqrt() * var_b.sqrt())
}

/// Did `a` close above `b` on the last point after being at or below it on
/// the previous one?
pub fn crossover(a: &[f64], b: &[f64]) -> bool {
    let n = a.len().min(b.len());
    if n < 2 {
        return false;
    }
    let a = &a[a.len() - n..];
    let b = &b[b.len() - n..];
    a[n - 2] <= b[n - 2] && a[n - 1] > b[n - 1]
}

pub fn crossunder(a: &[f64], b: &[f64]) -> bool {
    let n = a.len().min(b.len());
    if n < 2 {
        return false;
    }
    let a = &a[a.len() - n..];
    let b = &b[b.len() - n..];
    a[n - 2] >= b[n - 2] && a[n - 1] < b[n - 1]
}

/// Least-squares slope per step; positive means uptrend.
pub fn trend_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean_x = (n - 1) as f64 / 2.0;
    let mean_y = values.iter().sum::<f64>() / n as f64;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, &v) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        num += dx * (v - mean_y);
        den += dx * dx;
    }
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}
