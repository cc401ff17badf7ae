//! Resolves parsed queries against the directory and market data, and
//! renders the user-facing answer text.

use std::sync::Arc;

use chrono::NaiveDate;
use comfy_table::{Table, presets::ASCII_MARKDOWN};
use tracing::error;

use crate::clock::Clock;
use crate::directory::{Coin, CoinDirectory};
use crate::market_data::{MarketDataSource, PriceInfo};
use crate::query::{self, ParsedQuery};

pub struct AnswerGenerator {
    directory: Arc<CoinDirectory>,
    source: Arc<dyn MarketDataSource>,
    clock: Arc<dyn Clock>,
}

impl AnswerGenerator {
    pub fn new(
        directory: Arc<CoinDirectory>,
        source: Arc<dyn MarketDataSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        AnswerGenerator {
            directory,
            source,
            clock,
        }
    }

    /// Answers a free-text prompt. Total: every code path, including
    /// upstream failures, resolves to a displayable string.
    pub async fn generate(&self, text: &str, want_markdown: bool) -> String {
        let lines = match query::parse(text, &self.directory).await {
            ParsedQuery::Conversion { amount, from, to } => self.convert(amount, &from, &to).await,
            ParsedQuery::PriceLookup {
                tokens,
                amounts,
                currencies,
                date: Some(date),
            } => {
                self.historical_lookup(&tokens, &amounts, &currencies, date)
                    .await
            }
            ParsedQuery::PriceLookup {
                tokens,
                amounts,
                currencies,
                date: None,
            } => self.current_lookup(&tokens, &amounts, &currencies).await,
        };

        if want_markdown {
            render_markdown(&lines)
        } else {
            lines.join("\n")
        }
    }

    async fn convert(&self, amount: f64, from: &str, to: &str) -> Vec<String> {
        let Some(from_coin) = self.directory.find(from).await else {
            return vec![format!("Sorry, I don't know the token \"{from}\".")];
        };
        let Some(to_coin) = self.directory.find(to).await else {
            return vec![format!("Sorry, I don't know the token \"{to}\".")];
        };

        // Token-to-token conversions always go through the USD pivot.
        let ids = vec![from_coin.id.clone(), to_coin.id.clone()];
        let snapshots = match self.source.prices(&ids, "usd").await {
            Ok(snapshots) => snapshots,
            Err(e) => {
                error!("Conversion data fetch failed: {e:#}");
                return vec!["Error fetching conversion data, please try again later.".to_string()];
            }
        };
        let price_of = |id: &str| {
            snapshots
                .get(id)
                .and_then(|info| info.price)
                .filter(|p| *p > 0.0)
        };
        let (Some(price_from), Some(price_to)) =
            (price_of(&from_coin.id), price_of(&to_coin.id))
        else {
            return vec!["Error fetching conversion data, please try again later.".to_string()];
        };

        let value = amount * (price_from / price_to);
        vec![format!(
            "{} {} = {} {}",
            format_amount(amount),
            from_coin.symbol.to_uppercase(),
            format_value(value),
            to_coin.symbol.to_uppercase()
        )]
    }

    async fn historical_lookup(
        &self,
        tokens: &[Coin],
        amounts: &[f64],
        currencies: &[String],
        date: NaiveDate,
    ) -> Vec<String> {
        let today = self.clock.now().date_naive();
        if date > today {
            return vec![format!(
                "Cannot look up prices for {date}: that date is in the future."
            )];
        }

        let mut lines = Vec::new();
        for (coin, amount) in tokens.iter().zip(amounts) {
            let snapshot = match self.source.historical(&coin.id, date).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    error!("Historical data fetch failed for {}: {e:#}", coin.id);
                    lines.push(format!(
                        "No historical data for {} on {}.",
                        coin.symbol.to_uppercase(),
                        date
                    ));
                    continue;
                }
            };
            if snapshot.is_empty() {
                lines.push(format!(
                    "No historical data for {} on {}.",
                    coin.symbol.to_uppercase(),
                    date
                ));
                continue;
            }
            for currency in currencies {
                let info = snapshot.get(currency).cloned().unwrap_or_default();
                match info.price.filter(|p| *p > 0.0) {
                    Some(price) => {
                        lines.push(detail_line(coin, *amount, currency, price, &info, Some(date)));
                    }
                    None => lines.push(format!(
                        "No historical price for {} in {} on {}.",
                        coin.symbol.to_uppercase(),
                        currency.to_uppercase(),
                        date
                    )),
                }
            }
        }
        lines
    }

    async fn current_lookup(
        &self,
        tokens: &[Coin],
        amounts: &[f64],
        currencies: &[String],
    ) -> Vec<String> {
        let ids: Vec<String> = tokens.iter().map(|coin| coin.id.clone()).collect();
        let mut lines = Vec::new();
        for currency in currencies {
            let snapshots = match self.source.prices(&ids, currency).await {
                Ok(snapshots) => snapshots,
                Err(e) => {
                    error!("Price fetch failed: {e:#}");
                    lines.push("Error fetching price data, please try again later.".to_string());
                    continue;
                }
            };
            for (coin, amount) in tokens.iter().zip(amounts) {
                let Some(info) = snapshots.get(&coin.id) else {
                    continue;
                };
                if let Some(price) = info.price.filter(|p| *p > 0.0) {
                    lines.push(detail_line(coin, *amount, currency, price, info, None));
                }
            }
        }
        if lines.is_empty() {
            lines.push("No price data found for that query.".to_string());
        }
        lines
    }
}

fn detail_line(
    coin: &Coin,
    amount: f64,
    currency: &str,
    price: f64,
    info: &PriceInfo,
    date: Option<NaiveDate>,
) -> String {
    let total = amount * price;
    let when = date.map(|d| format!(" on {d}")).unwrap_or_default();
    format!(
        "{} {} = {} {}{} (price {}, market cap {}, 24h volume {}, 24h change {})",
        format_amount(amount),
        coin.symbol.to_uppercase(),
        format_value(total),
        currency.to_uppercase(),
        when,
        format_value(price),
        format_value(info.market_cap.unwrap_or(0.0)),
        format_value(info.volume_24h.unwrap_or(0.0)),
        format_change(info.change_24h),
    )
}

/// Display rules for monetary values: two decimals with thousands grouping
/// from 1 upwards, up to eight decimals below 1, "N/A" otherwise.
fn format_value(value: f64) -> String {
    if !value.is_finite() || value <= 0.0 {
        return "N/A".to_string();
    }
    if value >= 1.0 {
        group_thousands(&format!("{value:.2}"))
    } else {
        format!("{value:.8}")
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

/// Amounts print without a forced fraction: "10", not "10.00".
fn format_amount(amount: f64) -> String {
    if !amount.is_finite() {
        return "N/A".to_string();
    }
    if amount.fract() == 0.0 {
        group_thousands(&format!("{amount:.0}"))
    } else {
        format_value(amount)
    }
}

fn format_change(change: Option<f64>) -> String {
    match change {
        Some(change) if change.is_finite() => format!("{change:.2}%"),
        _ => "N/A".to_string(),
    }
}

fn group_thousands(formatted: &str) -> String {
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (formatted, None),
    };
    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    match frac_part {
        Some(frac_part) => format!("{grouped}.{frac_part}"),
        None => grouped,
    }
}

/// Renders already-formatted lines as a markdown table. Lines of the shape
/// "AMOUNT SYMBOL = TOTAL CURRENCY ..." fill all four columns; anything
/// else lands whole in the first column.
fn render_markdown(lines: &[String]) -> String {
    let mut table = Table::new();
    table.load_preset(ASCII_MARKDOWN);
    table.set_header(vec!["Amount", "Token", "Value", "Currency"]);
    for line in lines {
        match split_detail_line(line) {
            Some([amount, token, value, currency]) => {
                table.add_row(vec![amount, token, value, currency]);
            }
            None => {
                table.add_row(vec![line.as_str(), "", "", ""]);
            }
        }
    }
    table.to_string()
}

fn split_detail_line(line: &str) -> Option<[&str; 4]> {
    let (left, right) = line.split_once(" = ")?;
    let mut left_parts = left.split_whitespace();
    let amount = left_parts.next()?;
    let token = left_parts.next()?;
    if left_parts.next().is_some() {
        return None;
    }
    let mut right_parts = right.split_whitespace();
    let value = right_parts.next()?;
    let currency = right_parts.next()?;
    if !is_numeric_token(amount) || !is_numeric_token(value) {
        return None;
    }
    Some([amount, token, value, currency])
}

fn is_numeric_token(token: &str) -> bool {
    token.replace(',', "").parse::<f64>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::testing::ManualClock;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn coin(id: &str, symbol: &str, name: &str) -> Coin {
        Coin {
            id: id.to_string(),
            symbol: symbol.to_string(),
            name: name.to_string(),
        }
    }

    fn sample_directory() -> CoinDirectory {
        CoinDirectory::with_coins(vec![
            coin("bitcoin", "btc", "Bitcoin"),
            coin("ethereum", "eth", "Ethereum"),
            coin("dogecoin", "doge", "Dogecoin"),
        ])
    }

    #[derive(Default)]
    struct MockSource {
        prices: HashMap<String, PriceInfo>,
        historical: HashMap<String, HashMap<String, PriceInfo>>,
        fail_prices: bool,
        history_calls: AtomicUsize,
    }

    impl MockSource {
        fn with_price(mut self, id: &str, price: f64) -> Self {
            self.prices.insert(
                id.to_string(),
                PriceInfo {
                    price: Some(price),
                    ..PriceInfo::default()
                },
            );
            self
        }

        fn with_history(mut self, id: &str, currency: &str, price: f64) -> Self {
            self.historical
                .entry(id.to_string())
                .or_default()
                .insert(
                    currency.to_string(),
                    PriceInfo {
                        price: Some(price),
                        market_cap: Some(500_000_000_000.0),
                        ..PriceInfo::default()
                    },
                );
            self
        }
    }

    #[async_trait]
    impl MarketDataSource for MockSource {
        async fn prices(
            &self,
            ids: &[String],
            _vs_currency: &str,
        ) -> anyhow::Result<HashMap<String, PriceInfo>> {
            if self.fail_prices {
                return Err(anyhow!("provider unavailable"));
            }
            Ok(ids
                .iter()
                .filter_map(|id| self.prices.get(id).map(|info| (id.clone(), info.clone())))
                .collect())
        }

        async fn historical(
            &self,
            id: &str,
            _date: NaiveDate,
        ) -> anyhow::Result<HashMap<String, PriceInfo>> {
            self.history_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.historical.get(id).cloned().unwrap_or_default())
        }
    }

    fn generator(source: MockSource) -> AnswerGenerator {
        let clock = Arc::new(ManualClock::at(
            Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
        ));
        AnswerGenerator::new(
            Arc::new(sample_directory()),
            Arc::new(source),
            clock,
        )
    }

    #[tokio::test]
    async fn test_conversion_renders_single_line() {
        let source = MockSource::default()
            .with_price("dogecoin", 0.07)
            .with_price("bitcoin", 28000.0);
        let generator = generator(source);

        let answer = generator.generate("convert 10 doge to btc", false).await;
        assert_eq!(answer, "10 DOGE = 0.000025 BTC");
    }

    #[tokio::test]
    async fn test_conversion_with_unknown_token_names_the_reference() {
        let generator = generator(MockSource::default());
        let answer = generator.generate("convert 10 zzzzzzz to btc", false).await;
        assert_eq!(answer, "Sorry, I don't know the token \"zzzzzzz\".");
    }

    #[tokio::test]
    async fn test_conversion_fetch_failure_becomes_generic_string() {
        let source = MockSource {
            fail_prices: true,
            ..MockSource::default()
        };
        let generator = generator(source);
        let answer = generator.generate("convert 10 doge to btc", false).await;
        assert_eq!(
            answer,
            "Error fetching conversion data, please try again later."
        );
    }

    #[tokio::test]
    async fn test_current_lookup_renders_detail_line() {
        let source = MockSource::default().with_price("bitcoin", 27000.0);
        let generator = generator(source);
        let answer = generator.generate("price of bitcoin", false).await;
        assert!(answer.starts_with("1 BTC = 27,000.00 USD"), "got: {answer}");
        assert!(answer.contains("market cap N/A"), "got: {answer}");
        assert!(answer.contains("24h change N/A"), "got: {answer}");
    }

    #[tokio::test]
    async fn test_future_date_is_rejected_without_fetching() {
        let source = Arc::new(MockSource::default().with_history("bitcoin", "usd", 27075.33));
        let clock = Arc::new(ManualClock::at(
            Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
        ));
        let generator = AnswerGenerator::new(
            Arc::new(sample_directory()),
            Arc::clone(&source) as Arc<dyn MarketDataSource>,
            clock,
        );

        let answer = generator
            .generate("price of bitcoin on 2999-01-01", false)
            .await;
        assert_eq!(
            answer,
            "Cannot look up prices for 2999-01-01: that date is in the future."
        );
        assert_eq!(source.history_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_historical_lookup_renders_dated_line() {
        let source = MockSource::default().with_history("bitcoin", "usd", 27075.33);
        let generator = generator(source);
        let answer = generator
            .generate("price of bitcoin on 2023-06-01", false)
            .await;
        assert!(
            answer.starts_with("1 BTC = 27,075.33 USD on 2023-06-01"),
            "got: {answer}"
        );
        assert!(answer.contains("market cap 500,000,000,000.00"), "got: {answer}");
    }

    #[tokio::test]
    async fn test_historical_lookup_without_data_emits_per_token_line() {
        let generator = generator(MockSource::default());
        let answer = generator
            .generate("price of bitcoin on 2023-06-01", false)
            .await;
        assert_eq!(answer, "No historical data for BTC on 2023-06-01.");
    }

    #[tokio::test]
    async fn test_missing_currency_in_history_emits_no_price_line() {
        let source = MockSource::default().with_history("bitcoin", "usd", 27075.33);
        let generator = generator(source);
        let answer = generator
            .generate("price of bitcoin in eur on 2023-06-01", false)
            .await;
        assert_eq!(
            answer,
            "No historical price for BTC in EUR on 2023-06-01."
        );
    }

    #[tokio::test]
    async fn test_markdown_table_has_four_columns() {
        let source = MockSource::default().with_price("bitcoin", 27000.0);
        let generator = generator(source);
        let answer = generator.generate("price of bitcoin", true).await;
        assert!(answer.contains("Amount"), "got: {answer}");
        assert!(answer.contains("| 1"), "got: {answer}");
        assert!(answer.contains("BTC"), "got: {answer}");
        assert!(answer.contains("27,000.00"), "got: {answer}");
        assert!(answer.contains("USD"), "got: {answer}");
    }

    #[tokio::test]
    async fn test_markdown_keeps_unmatched_lines_in_first_column() {
        let generator = generator(MockSource::default());
        let answer = generator
            .generate("price of bitcoin on 2023-06-01", true)
            .await;
        assert!(
            answer.contains("No historical data for BTC on 2023-06-01."),
            "got: {answer}"
        );
    }

    #[test]
    fn test_split_detail_line() {
        assert_eq!(
            split_detail_line("10 DOGE = 0.000025 BTC"),
            Some(["10", "DOGE", "0.000025", "BTC"])
        );
        assert_eq!(
            split_detail_line("1 BTC = 27,000.00 USD (price 27,000.00, market cap N/A)"),
            Some(["1", "BTC", "27,000.00", "USD"])
        );
        assert_eq!(split_detail_line("No historical data for BTC."), None);
        assert_eq!(split_detail_line("word salad = not a price"), None);
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(1234.5), "1,234.50");
        assert_eq!(format_value(27000.0), "27,000.00");
        assert_eq!(format_value(1.0), "1.00");
        assert_eq!(format_value(0.5), "0.5");
        assert_eq!(format_value(0.12345678), "0.12345678");
        assert_eq!(format_value(0.000025), "0.000025");
        assert_eq!(format_value(0.0), "N/A");
        assert_eq!(format_value(-3.0), "N/A");
        assert_eq!(format_value(f64::NAN), "N/A");
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(10.0), "10");
        assert_eq!(format_amount(1500.0), "1,500");
        assert_eq!(format_amount(1.5), "1.50");
        assert_eq!(format_amount(0.5), "0.5");
    }
}
