use anyhow::{Context, Result, bail};
use rust_decimal::Decimal;
use serde::Serialize;
use std::process;
use std::str::FromStr;

use basket_core::models::Scoped;

/// Unwrap a scoped result, or tell the user to sign in and exit with code 2.
pub(crate) fn signed_in<T>(scoped: Scoped<T>, json: bool) -> T {
    match scoped {
        Scoped::Authenticated(value) => value,
        Scoped::Unauthenticated => {
            if json {
                println!("{}", json_error("Not signed in"));
            } else {
                eprintln!("Not signed in. Pass --user <id> or set BASKET_USER.");
            }
            process::exit(2);
        }
    }
}

/// Exit with code 2 after reporting an empty listing.
pub(crate) fn exit_empty(json: bool, message: &str) -> ! {
    if json {
        println!("[]");
    } else {
        eprintln!("{message}");
    }
    process::exit(2);
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse a quantity such as "2", "2.5", "0,5" or "1/2".
pub(crate) fn parse_quantity(s: &str) -> Result<Decimal> {
    let s = s.trim();
    let quantity = if let Some((num, den)) = s.split_once('/') {
        let num = Decimal::from_str(num.trim())
            .with_context(|| format!("Invalid quantity: '{s}'"))?;
        let den = Decimal::from_str(den.trim())
            .with_context(|| format!("Invalid quantity: '{s}'"))?;
        if den.is_zero() {
            bail!("Invalid quantity: '{s}' divides by zero");
        }
        (num / den).round_dp(3)
    } else {
        Decimal::from_str(&s.replace(',', "."))
            .with_context(|| format!("Invalid quantity: '{s}'. Use a number like '2', '2.5' or '1/2'"))?
    };
    if quantity.is_sign_negative() && !quantity.is_zero() {
        bail!("Quantity must not be negative");
    }
    Ok(quantity.normalize())
}

pub(crate) fn format_quantity(quantity: Decimal, unit: &str) -> String {
    let quantity = quantity.normalize();
    if unit.is_empty() {
        quantity.to_string()
    } else {
        format!("{quantity} {unit}")
    }
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
