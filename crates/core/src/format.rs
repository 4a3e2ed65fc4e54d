//! Indonesian-locale number formatting.

use rust_decimal::Decimal;

/// Format an amount as Rupiah with `.` thousands and `,` decimal separators.
///
/// At most three fraction digits are kept and trailing zeros dropped, so
/// `1500000.00` renders as `Rp 1.500.000`.
pub fn format_rupiah(amount: Decimal) -> String {
    format!("Rp {}", format_grouped(amount))
}

/// Group digits of `amount` in the `id-ID` style without a currency prefix.
pub fn format_grouped(amount: Decimal) -> String {
    let rounded = amount.round_dp(3).normalize();
    let text = rounded.abs().to_string();
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (text.as_str(), None),
    };

    let mut out = String::with_capacity(text.len() + int_part.len() / 3 + 1);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        out.push('-');
    }
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    if let Some(frac) = frac_part {
        out.push(',');
        out.push_str(frac);
    }
    out
}
