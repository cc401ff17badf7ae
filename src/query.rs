//! Classifies free text into a structured price query.

use chrono::NaiveDate;

use crate::directory::{Coin, CoinDirectory};

/// Quote currencies recognised without a directory lookup.
const FIATS: &[&str] = &[
    "usd", "eur", "gbp", "jpy", "inr", "aud", "cad", "chf", "cny", "hkd", "krw", "rub", "brl",
    "zar", "sek", "nok", "nzd", "mxn", "sgd", "try", "pln", "aed",
];

/// Filler words ignored during token extraction. "rice" absorbs the most
/// common mistyping of "price".
const STOP_WORDS: &[&str] = &[
    "the", "an", "of", "in", "on", "at", "to", "for", "and", "or", "is", "are", "was", "be", "it",
    "do", "does", "what", "whats", "how", "much", "many", "me", "my", "you", "your", "tell",
    "show", "give", "get", "find", "please", "today", "now", "right", "current", "currently",
    "worth", "cost", "costs", "about", "with", "price", "prices", "rice", "value",
];

const NUMBER_WORDS: &[(&str, f64)] = &[
    ("zero", 0.0),
    ("one", 1.0),
    ("two", 2.0),
    ("three", 3.0),
    ("four", 4.0),
    ("five", 5.0),
    ("six", 6.0),
    ("seven", 7.0),
    ("eight", 8.0),
    ("nine", 9.0),
    ("ten", 10.0),
    ("eleven", 11.0),
    ("twelve", 12.0),
    ("thirteen", 13.0),
    ("fourteen", 14.0),
    ("fifteen", 15.0),
    ("sixteen", 16.0),
    ("seventeen", 17.0),
    ("eighteen", 18.0),
    ("nineteen", 19.0),
    ("twenty", 20.0),
];

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedQuery {
    /// "convert 10 doge to btc". References are raw, resolved later.
    Conversion {
        amount: f64,
        from: String,
        to: String,
    },
    /// Everything else. `amounts` is aligned 1:1 with `tokens`.
    PriceLookup {
        tokens: Vec<Coin>,
        amounts: Vec<f64>,
        currencies: Vec<String>,
        date: Option<NaiveDate>,
    },
}

/// Parses free text into a query. Total: ambiguous input falls back to
/// defaults instead of failing, pushing "not found" downstream.
pub async fn parse(text: &str, directory: &CoinDirectory) -> ParsedQuery {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !(c.is_alphanumeric() || c == '-')))
        .filter(|w| !w.is_empty())
        .collect();

    if let Some(parsed) = match_conversion(&words) {
        return parsed;
    }

    price_lookup(&words, directory).await
}

/// Tries the three fixed conversion shapes in order; first match wins.
fn match_conversion(words: &[&str]) -> Option<ParsedQuery> {
    // "convert AMOUNT TOK1 to TOK2"
    if words.len() >= 5 && words[0] == "convert" && words[3] == "to" {
        return Some(conversion(words[1], words[2], words[4]));
    }
    // "AMOUNT TOK1 to TOK2" with a leading recognisable amount
    if words.len() >= 4 && words[2] == "to" && parse_amount(words[0]).is_some() {
        return Some(conversion(words[0], words[1], words[3]));
    }
    // "how much is AMOUNT TOK1 in TOK2"
    if words.len() >= 7 && words[..3] == ["how", "much", "is"] && words[5] == "in" {
        return Some(conversion(words[3], words[4], words[6]));
    }
    None
}

fn conversion(amount: &str, from: &str, to: &str) -> ParsedQuery {
    ParsedQuery::Conversion {
        amount: parse_amount(amount).unwrap_or(1.0),
        from: from.to_string(),
        to: to.to_string(),
    }
}

async fn price_lookup(words: &[&str], directory: &CoinDirectory) -> ParsedQuery {
    // Pull out a single embedded ISO date, if any.
    let mut date = None;
    let mut remaining: Vec<&str> = Vec::new();
    for word in words {
        if date.is_none() && looks_like_iso_date(word) {
            if let Ok(parsed) = NaiveDate::parse_from_str(word, "%Y-%m-%d") {
                date = Some(parsed);
                continue;
            }
        }
        remaining.push(word);
    }

    // Word-like segments are candidate token/currency references; amounts
    // were already consumed from the raw word sequence below.
    let segments = remaining
        .iter()
        .flat_map(|w| w.split(|c: char| !(c.is_alphanumeric() || c == '-')))
        .filter(|s| !s.is_empty());

    let mut tokens: Vec<Coin> = Vec::new();
    let mut currencies: Vec<String> = Vec::new();
    for segment in segments {
        if segment.len() < 2
            || STOP_WORDS.contains(&segment)
            || parse_amount(segment).is_some()
        {
            continue;
        }
        if FIATS.contains(&segment) {
            if !currencies.iter().any(|c| c == segment) {
                currencies.push(segment.to_string());
            }
            continue;
        }
        if let Some(found) = directory.find(segment).await {
            if !tokens.iter().any(|t| t.id == found.id) {
                tokens.push(found);
            }
        }
    }

    if tokens.is_empty() {
        tokens.push(directory.find("bitcoin").await.unwrap_or(Coin {
            id: "bitcoin".to_string(),
            symbol: "btc".to_string(),
            name: "Bitcoin".to_string(),
        }));
    }
    if currencies.is_empty() {
        currencies.push("usd".to_string());
    }

    // "to WORD" overrides the collected fiat list with a single currency.
    for pair in remaining.windows(2) {
        if pair[0] != "to" {
            continue;
        }
        let target = pair[1];
        if FIATS.contains(&target) {
            currencies = vec![target.to_string()];
            break;
        }
        if let Some(found) = directory.find(target).await {
            currencies = vec![found.symbol.to_lowercase()];
            break;
        }
    }

    let amounts = align_amounts(&remaining, tokens.len());

    ParsedQuery::PriceLookup {
        tokens,
        amounts,
        currencies,
        date,
    }
}

/// Extracts amounts from the raw words and reconciles the count against the
/// token count, so `amounts.len() == tokens.len()` always holds.
fn align_amounts(words: &[&str], token_count: usize) -> Vec<f64> {
    let mut amounts: Vec<f64> = words.iter().filter_map(|w| parse_decimal(w)).collect();
    if amounts.is_empty() {
        amounts = words.iter().filter_map(|w| number_word(w)).collect();
    }
    if amounts.is_empty() {
        return vec![1.0; token_count];
    }
    let first = amounts[0];
    while amounts.len() < token_count {
        amounts.push(first);
    }
    amounts.truncate(token_count);
    amounts
}

fn looks_like_iso_date(word: &str) -> bool {
    word.len() == 10 && word.as_bytes()[4] == b'-' && word.as_bytes()[7] == b'-'
}

fn parse_amount(word: &str) -> Option<f64> {
    parse_decimal(word).or_else(|| number_word(word))
}

fn parse_decimal(word: &str) -> Option<f64> {
    let cleaned = word.replace(',', "");
    if !cleaned.chars().next()?.is_ascii_digit() {
        return None;
    }
    cleaned.parse().ok()
}

fn number_word(word: &str) -> Option<f64> {
    NUMBER_WORDS
        .iter()
        .find(|(name, _)| *name == word)
        .map(|(_, value)| *value)
}
