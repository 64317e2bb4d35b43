use super::amount::NativeAmount;

/// Render a native amount in display units, e.g. `12345` with 4 decimals as `1.2345`.
pub fn format_token_amount(amount: &NativeAmount, decimals: u32) -> String {
	let digits = amount.abs().to_string();
	let sign = if amount.is_negative() { "-" } else { "" };
	let decimals = decimals as usize;
	if decimals == 0 {
		return format!("{}{}", sign, digits);
	}

	let padded = format!("{:0>width$}", digits, width = decimals + 1);
	let (whole, fraction) = padded.split_at(padded.len() - decimals);
	format!("{}{}.{}", sign, whole, fraction)
}
