use rand::Rng;

use crate::types::Time;

/// Everything the gateway needs to raise a collection request
pub struct CollectionRequest<'a> {
	pub payee_upi_id: &'a str,
	pub payee_name: &'a str,
	/// Whole currency units
	pub amount: i64,
	pub note: &'a str,
	pub at: Time,
}

/// Gateway-issued handle for a payment the payer still has to complete
#[derive(PartialEq, Debug, Clone)]
pub struct PaymentHandle {
	pub upi_transaction_id: String,
	pub payment_link: String,
	pub qr_code_url: Option<String>,
}

/// Seam for the payment rail; the ledger treats its output as data
pub trait PaymentGateway {
	fn collection_request(&self, request: &CollectionRequest) -> PaymentHandle;
}

/// Builds `upi://pay` deep links any UPI app can open
///
/// QR rendering is left to the caller, so the handle carries no image
pub struct UpiGateway;

impl PaymentGateway for UpiGateway {
	fn collection_request(&self, request: &CollectionRequest) -> PaymentHandle {
		let payment_link = format!(
			"upi://pay?pa={}&pn={}&am={}&cu=INR&tn={}",
			percent_encode(request.payee_upi_id),
			percent_encode(request.payee_name),
			request.amount,
			percent_encode(request.note),
		);

		PaymentHandle {
			upi_transaction_id: generate_upi_id(request.at),
			payment_link,
			qr_code_url: None,
		}
	}
}

/// `UPI_<millis>_<8 hex chars>`
pub fn generate_upi_id(at: Time) -> String {
	let entropy: u32 = rand::thread_rng().gen();
	format!("UPI_{}_{:08X}", at.and_utc().timestamp_millis(), entropy)
}

/// `local@handle`, both sides restricted to the narrow set UPI handles use
pub fn validate_upi_id(id: &str) -> bool {
	let Some((local, handle)) = id.split_once('@') else {
		return false;
	};
	let local_ok = !local.is_empty()
		&& local.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
	let handle_ok = !handle.is_empty()
		&& handle.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-'));
	local_ok && handle_ok
}

fn percent_encode(s: &str) -> String {
	let mut out = String::with_capacity(s.len());
	for b in s.bytes() {
		match b {
			b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
			_ => out.push_str(&format!("%{:02X}", b)),
		}
	}
	out
}
