use capm_core::{BetaAlpha, CapmError, ReturnTable};

/// OLS regression of `y = beta * x + alpha`.
///
/// Fails with `DegenerateRegression` when `x` has no variance.
pub fn ols_fit(ticker: &str, x: &[f64], y: &[f64]) -> Result<BetaAlpha, CapmError> {
    let n = x.len().min(y.len());
    if n < 2 {
        return Err(CapmError::InsufficientData {
            ticker: ticker.to_string(),
            required: 2,
            got: n,
        });
    }

    let x = &x[..n];
    let y = &y[..n];
    let nf = n as f64;
    let x_mean = x.iter().sum::<f64>() / nf;
    let y_mean = y.iter().sum::<f64>() / nf;

    let mut ss_xy = 0.0;
    let mut ss_xx = 0.0;
    let mut ss_yy = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - x_mean;
        let dy = yi - y_mean;
        ss_xy += dx * dy;
        ss_xx += dx * dx;
        ss_yy += dy * dy;
    }

    let scale: f64 = x.iter().map(|v| v * v).sum();
    if ss_xx == 0.0 || ss_xx <= f64::EPSILON * scale {
        return Err(CapmError::DegenerateRegression {
            ticker: ticker.to_string(),
        });
    }

    let beta = ss_xy / ss_xx;
    let alpha = y_mean - beta * x_mean;
    let r_squared = if ss_yy > 1e-15 {
        (ss_xy * ss_xy) / (ss_xx * ss_yy)
    } else {
        0.0
    };

    Ok(BetaAlpha {
        ticker: ticker.to_string(),
        beta,
        alpha,
        r_squared,
    })
}

/// Beta and alpha of `ticker` against `benchmark` over the full return history.
pub fn beta_alpha(
    returns: &ReturnTable,
    ticker: &str,
    benchmark: &str,
) -> Result<BetaAlpha, CapmError> {
    returns.check_shape()?;
    let y = returns
        .column(ticker)
        .ok_or_else(|| CapmError::UnknownTicker(ticker.to_string()))?;
    let x = returns
        .column(benchmark)
        .ok_or_else(|| CapmError::UnknownTicker(benchmark.to_string()))?;

    let fit = ols_fit(ticker, x, y)?;
    tracing::debug!("{} vs {}: beta={:.4} alpha={:.4}", ticker, benchmark, fit.beta, fit.alpha);
    Ok(fit)
}

/// Beta and alpha for every non-benchmark column of the table.
pub fn betas(returns: &ReturnTable) -> Result<Vec<BetaAlpha>, CapmError> {
    let benchmark = returns.benchmark.as_deref().ok_or(CapmError::MissingBenchmark)?;
    returns
        .asset_tickers()
        .into_iter()
        .map(|ticker| beta_alpha(returns, ticker, benchmark))
        .collect()
}
