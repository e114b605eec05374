//! Performance metrics and statistics.
//!
//! Every field is finite by construction: undefined ratios are reported as
//! 0.0 and any non-finite intermediate is replaced by 0.0 before it is
//! stored. Percentages are on a 0..100 scale.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::portfolio::EquityPoint;
use super::position::Trade;

const PERIODS_PER_YEAR: f64 = 252.0;
const DAYS_PER_MONTH: f64 = 30.44;

/// Qualitative summary of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rating {
    Excellent,
    #[serde(rename = "Very Good")]
    VeryGood,
    Good,
    Fair,
    Poor,
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rating::Excellent => "Excellent",
            Rating::VeryGood => "Very Good",
            Rating::Good => "Good",
            Rating::Fair => "Fair",
            Rating::Poor => "Poor",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub breakeven_trades: usize,
    pub win_rate: f64,
    pub gross_profit: f64,
    /// Absolute sum of losing trades' net P&L.
    pub gross_loss: f64,
    pub profit_factor: f64,
    pub net_profit: f64,
    pub total_return_pct: f64,
    pub annualized_return_pct: f64,
    pub max_drawdown: f64,
    pub max_drawdown_amount: f64,
    /// Longest stretch below a prior peak, in equity points (bars).
    pub max_drawdown_duration: usize,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub expectancy: f64,
    pub max_consecutive_wins: usize,
    pub max_consecutive_losses: usize,
    pub avg_trade_duration_hours: f64,
    /// Trades per 30.44-day month over the span of the equity curve.
    pub trades_per_month: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub volatility: f64,
    pub calmar_ratio: f64,
    pub recovery_factor: f64,
    pub rating: Rating,
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator != 0.0 {
        finite_or_zero(numerator / denominator)
    } else {
        0.0
    }
}

/// Profit factor with the zero-loss fallbacks: no losses reports the gross
/// profit itself, no trades at all reports 0.
pub fn profit_factor(gross_profit: f64, gross_loss: f64) -> f64 {
    let pf = if gross_loss > 0.0 {
        gross_profit / gross_loss
    } else if gross_profit > 0.0 {
        gross_profit
    } else {
        0.0
    };
    finite_or_zero(pf).max(0.0)
}

impl Metrics {
    pub fn compute(
        trades: &[Trade],
        equity_curve: &[EquityPoint],
        initial_capital: f64,
        risk_free_rate: f64,
    ) -> Self {
        let mut winning_trades = 0usize;
        let mut losing_trades = 0usize;
        let mut breakeven_trades = 0usize;
        let mut gross_profit = 0.0_f64;
        let mut gross_loss = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut total_duration_hours = 0.0_f64;
        let mut max_consecutive_wins = 0usize;
        let mut max_consecutive_losses = 0usize;
        let mut win_streak = 0usize;
        let mut loss_streak = 0usize;

        for trade in trades {
            let pnl = finite_or_zero(trade.net_pnl);
            if pnl > 0.0 {
                winning_trades += 1;
                gross_profit += pnl;
                largest_win = largest_win.max(pnl);
                win_streak += 1;
                loss_streak = 0;
            } else if pnl < 0.0 {
                losing_trades += 1;
                gross_loss += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
                loss_streak += 1;
                win_streak = 0;
            } else {
                breakeven_trades += 1;
                win_streak = 0;
                loss_streak = 0;
            }
            max_consecutive_wins = max_consecutive_wins.max(win_streak);
            max_consecutive_losses = max_consecutive_losses.max(loss_streak);
            total_duration_hours += trade.duration().num_seconds() as f64 / 3600.0;
        }

        let total_trades = trades.len();
        let n = total_trades as f64;
        let net_profit = gross_profit - gross_loss;

        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_capital);
        let total_return_pct = ratio(final_equity - initial_capital, initial_capital) * 100.0;

        let years = equity_curve.len() as f64 / PERIODS_PER_YEAR;
        let growth = ratio(final_equity, initial_capital);
        let annualized_return_pct = if years > 0.0 && growth > 0.0 {
            finite_or_zero((growth.powf(1.0 / years) - 1.0) * 100.0)
        } else {
            0.0
        };

        let span_days = match (equity_curve.first(), equity_curve.last()) {
            (Some(first), Some(last)) => {
                (last.timestamp - first.timestamp).num_seconds() as f64 / 86_400.0
            }
            _ => 0.0,
        };
        let trades_per_month = ratio(n, span_days / DAYS_PER_MONTH);

        let drawdown = compute_drawdown(equity_curve);
        let risk = compute_risk_adjusted(equity_curve, risk_free_rate / PERIODS_PER_YEAR);

        let mut metrics = Metrics {
            total_trades,
            winning_trades,
            losing_trades,
            breakeven_trades,
            win_rate: ratio(winning_trades as f64, n) * 100.0,
            gross_profit: finite_or_zero(gross_profit),
            gross_loss: finite_or_zero(gross_loss),
            profit_factor: profit_factor(gross_profit, gross_loss),
            net_profit: finite_or_zero(net_profit),
            total_return_pct,
            annualized_return_pct,
            max_drawdown: drawdown.pct,
            max_drawdown_amount: drawdown.amount,
            max_drawdown_duration: drawdown.duration,
            avg_win: ratio(gross_profit, winning_trades as f64),
            avg_loss: ratio(gross_loss, losing_trades as f64),
            largest_win: finite_or_zero(largest_win),
            largest_loss: finite_or_zero(largest_loss),
            expectancy: ratio(net_profit, n),
            max_consecutive_wins,
            max_consecutive_losses,
            avg_trade_duration_hours: ratio(total_duration_hours, n),
            trades_per_month,
            sharpe_ratio: risk.sharpe,
            sortino_ratio: risk.sortino,
            volatility: risk.volatility,
            calmar_ratio: ratio(annualized_return_pct, drawdown.pct),
            recovery_factor: ratio(net_profit, drawdown.amount),
            rating: Rating::Poor,
        };
        metrics.rating = metrics.score();
        metrics
    }

    /// One-line verdict keyed on the rating.
    pub fn describe(&self) -> String {
        let ret = self.total_return_pct;
        let win = self.win_rate;
        match self.rating {
            Rating::Excellent => format!(
                "Outstanding performance with {:.1}% return and {:.1}% win rate",
                ret, win
            ),
            Rating::VeryGood => format!(
                "Strong performance with {:.1}% return and good risk management",
                ret
            ),
            Rating::Good => format!(
                "Solid performance with {:.1}% return and {:.1}% win rate",
                ret, win
            ),
            Rating::Fair => format!(
                "Moderate performance with {:.1}% return, needs optimization",
                ret
            ),
            Rating::Poor => format!(
                "Poor performance with {:.1}% return and significant risk",
                ret
            ),
        }
    }

    fn score(&self) -> Rating {
        let mut score = 0;

        score += if self.sharpe_ratio > 2.0 {
            3
        } else if self.sharpe_ratio > 1.5 {
            2
        } else if self.sharpe_ratio > 1.0 {
            1
        } else {
            0
        };

        score += if self.win_rate > 60.0 {
            2
        } else if self.win_rate > 50.0 {
            1
        } else {
            0
        };

        score += if self.profit_factor > 2.0 {
            2
        } else if self.profit_factor > 1.5 {
            1
        } else {
            0
        };

        score += if self.max_drawdown < 10.0 {
            2
        } else if self.max_drawdown < 20.0 {
            1
        } else {
            0
        };

        if self.total_return_pct > 0.0 {
            score += 1;
        }

        match score {
            s if s >= 8 => Rating::Excellent,
            s if s >= 6 => Rating::VeryGood,
            s if s >= 4 => Rating::Good,
            s if s >= 2 => Rating::Fair,
            _ => Rating::Poor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Drawdown {
    pct: f64,
    amount: f64,
    duration: usize,
}

/// Single forward pass over the curve. The percentage is relative to the
/// running peak and clamped to [0, 100].
fn compute_drawdown(equity_curve: &[EquityPoint]) -> Drawdown {
    let mut result = Drawdown {
        pct: 0.0,
        amount: 0.0,
        duration: 0,
    };
    let Some(first) = equity_curve.first() else {
        return result;
    };

    let mut peak = first.equity;
    let mut current_duration = 0usize;

    for point in equity_curve {
        if point.equity >= peak {
            peak = point.equity;
            current_duration = 0;
            continue;
        }
        current_duration += 1;
        result.duration = result.duration.max(current_duration);

        let amount = finite_or_zero(peak - point.equity);
        result.amount = result.amount.max(amount);
        if peak > 0.0 {
            let pct = finite_or_zero((peak - point.equity) / peak * 100.0);
            result.pct = result.pct.max(pct);
        }
    }

    result.pct = result.pct.clamp(0.0, 100.0);
    result
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct RiskAdjusted {
    sharpe: f64,
    sortino: f64,
    volatility: f64,
}

fn compute_risk_adjusted(equity_curve: &[EquityPoint], period_rf: f64) -> RiskAdjusted {
    let zero = RiskAdjusted {
        sharpe: 0.0,
        sortino: 0.0,
        volatility: 0.0,
    };
    if equity_curve.len() < 2 {
        return zero;
    }

    let returns: Vec<f64> = equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].equity;
            let curr = w[1].equity;
            if prev > 0.0 {
                finite_or_zero((curr - prev) / prev)
            } else {
                0.0
            }
        })
        .collect();

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;
    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    let annualizer = PERIODS_PER_YEAR.sqrt();

    let excess_return = mean - period_rf;

    let sharpe = if stddev > 0.0 {
        finite_or_zero(excess_return / stddev * annualizer)
    } else {
        0.0
    };

    let downside_sq: f64 = returns
        .iter()
        .filter(|&&r| r < period_rf)
        .map(|&r| (r - period_rf).powi(2))
        .sum();
    let downside_stddev = (downside_sq / n).sqrt();

    let sortino = if downside_stddev > 0.0 {
        finite_or_zero(excess_return / downside_stddev * annualizer)
    } else {
        0.0
    };

    RiskAdjusted {
        sharpe,
        sortino,
        volatility: finite_or_zero(stddev * annualizer * 100.0),
    }
}
