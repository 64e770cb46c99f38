//! Pure analysis helpers behind the specialist agents' tools.
//!
//! Everything here is deterministic computation over fetched data; the tool
//! handlers wrap these with `DataSource` calls and JSON argument parsing.

use crate::data::Financials;

/// Lexicon-scored headline sentiment in [-1, 1].
///
/// Crude by design: the sentiment agent uses this as a numeric anchor
/// alongside the model's own reading of the headlines.
pub fn sentiment_score(texts: &[String]) -> f64 {
    const POSITIVE: &[&str] = &[
        "beat", "beats", "surge", "surges", "rally", "record", "upgrade", "upgraded", "growth",
        "profit", "strong", "bullish", "gain", "gains", "jump", "jumps", "buyback", "dividend",
        "wins", "order win", "expansion",
    ];
    const NEGATIVE: &[&str] = &[
        "miss", "misses", "fall", "falls", "plunge", "plunges", "downgrade", "downgraded",
        "loss", "losses", "weak", "bearish", "drop", "drops", "probe", "penalty", "fraud",
        "default", "layoff", "layoffs", "slump",
    ];

    if texts.is_empty() {
        return 0.0;
    }
    let mut score = 0i64;
    let mut hits = 0i64;
    for text in texts {
        let lower = text.to_lowercase();
        for word in POSITIVE {
            if lower.contains(word) {
                score += 1;
                hits += 1;
            }
        }
        for word in NEGATIVE {
            if lower.contains(word) {
                score -= 1;
                hits += 1;
            }
        }
    }
    if hits == 0 {
        0.0
    } else {
        (score as f64 / hits as f64).clamp(-1.0, 1.0)
    }
}

/// Label for a sentiment score.
pub fn sentiment_label(score: f64) -> &'static str {
    if score > 0.5 {
        "very positive"
    } else if score > 0.15 {
        "positive"
    } else if score < -0.5 {
        "very negative"
    } else if score < -0.15 {
        "negative"
    } else {
        "neutral"
    }
}

/// Fixed-fractional position size: risk at most `risk_pct` of capital on the
/// distance between entry and stop. Returns whole shares.
pub fn position_size(capital: f64, risk_pct: f64, entry: f64, stop: f64) -> u64 {
    let risk_amount = capital * (risk_pct / 100.0);
    let per_share = (entry - stop).abs();
    if per_share <= 0.0 || risk_amount <= 0.0 || entry <= 0.0 {
        return 0;
    }
    let by_risk = (risk_amount / per_share).floor();
    // Never size beyond what capital can actually buy.
    let by_capital = (capital / entry).floor();
    by_risk.min(by_capital).max(0.0) as u64
}

/// ATR-multiple stop for a long entry.
pub fn atr_stop(entry: f64, atr: f64, multiplier: f64) -> f64 {
    (entry - atr * multiplier).max(0.0)
}

/// Annualized volatility (in %) from daily closes.
pub fn annualized_volatility(closes: &[f64]) -> f64 {
    if closes.len() < 2 {
        return 0.0;
    }
    let returns: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .collect();
    crate::ta::stddev(&returns) * (252.0f64).sqrt() * 100.0
}

/// One-line health summary of a fundamentals snapshot, used by the
/// fundamental agent's ratio tool.
pub fn ratio_summary(f: &Financials) -> String {
    let mut lines = Vec::new();
    lines.push(format!("P/E: {:.2}, P/B: {:.2}", f.pe_ratio, f.pb_ratio));
    lines.push(format!("ROE: {:.1}%, ROCE: {:.1}%", f.roe, f.roce));
    lines.push(format!("Debt/Equity: {:.2}", f.debt_to_equity));
    lines.push(format!(
        "Margins: operating {:.1}%, net {:.1}%",
        f.operating_margin, f.net_margin
    ));
    lines.push(format!(
        "Growth YoY: revenue {:.1}%, profit {:.1}%",
        f.revenue_growth_yoy, f.profit_growth_yoy
    ));
    if f.dividend_yield > 0.0 {
        lines.push(format!("Dividend yield: {:.2}%", f.dividend_yield));
    }
    if f.promoter_holding > 0.0 {
        lines.push(format!("Promoter holding: {:.1}%", f.promoter_holding));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentiment_direction() {
        let positive = vec![
            "TCS beats estimates, profit surges".to_string(),
            "Brokerages upgrade TCS on strong growth".to_string(),
        ];
        assert!(sentiment_score(&positive) > 0.5);

        let negative = vec!["Stock plunges after earnings miss".to_string()];
        assert!(sentiment_score(&negative) < -0.5);

        assert_eq!(sentiment_score(&[]), 0.0);
        assert_eq!(sentiment_score(&["board meeting on friday".to_string()]), 0.0);
    }

    #[test]
    fn test_sentiment_labels() {
        assert_eq!(sentiment_label(0.8), "very positive");
        assert_eq!(sentiment_label(0.3), "positive");
        assert_eq!(sentiment_label(0.0), "neutral");
        assert_eq!(sentiment_label(-0.3), "negative");
        assert_eq!(sentiment_label(-0.9), "very negative");
    }

    #[test]
    fn test_position_size_risk_bound() {
        // 1% of 1,00,000 = 1,000 risk; 20 risk/share -> 50 shares.
        assert_eq!(position_size(100_000.0, 1.0, 500.0, 480.0), 50);
        // Capital-bound: 50 by risk but only 40 affordable.
        assert_eq!(position_size(20_000.0, 5.0, 500.0, 480.0), 40);
        // Degenerate stops size to zero.
        assert_eq!(position_size(100_000.0, 1.0, 500.0, 500.0), 0);
    }

    #[test]
    fn test_atr_stop_floor() {
        assert_eq!(atr_stop(100.0, 5.0, 2.0), 90.0);
        assert_eq!(atr_stop(5.0, 10.0, 2.0), 0.0);
    }

    #[test]
    fn test_annualized_volatility_flat_is_zero() {
        assert_eq!(annualized_volatility(&[100.0, 100.0, 100.0]), 0.0);
        assert!(annualized_volatility(&[100.0, 105.0, 95.0, 102.0]) > 0.0);
    }
}
