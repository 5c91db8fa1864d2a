//! Daraja (M-Pesa) wire types: OAuth, STK push and the STK callback envelope.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub const TRANSACTION_TYPE_PAYBILL: &str = "CustomerPayBillOnline";
pub const RECEIPT_ITEM: &str = "MpesaReceiptNumber";
pub const AMOUNT_ITEM: &str = "Amount";
pub const PHONE_ITEM: &str = "PhoneNumber";

/// Response of `GET /oauth/v1/generate`. `expires_in` arrives as a string
/// from Daraja but some sandboxes send a number.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub access_token: Option<String>,
    pub expires_in: Option<JsonValue>,
}

impl AuthResponse {
    pub fn expires_in_secs(&self) -> Option<i64> {
        match self.expires_in.as_ref()? {
            JsonValue::Number(n) => n.as_i64(),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// What the initiator asks the gateway to push to the customer's handset.
#[derive(Debug, Clone, PartialEq)]
pub struct PushRequest {
    pub phone_number: String,
    pub amount: Decimal,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StkPushRequest {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "TransactionType")]
    pub transaction_type: String,
    #[serde(rename = "Amount")]
    pub amount: String,
    #[serde(rename = "PartyA")]
    pub party_a: String,
    #[serde(rename = "PartyB")]
    pub party_b: String,
    #[serde(rename = "PhoneNumber")]
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    #[serde(rename = "AccountReference")]
    pub account_reference: String,
    #[serde(rename = "TransactionDesc")]
    pub transaction_desc: String,
}

/// Body returned by `POST /mpesa/stkpush/v1/processrequest`. Success and
/// error bodies share the endpoint, so every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: Option<String>,
    #[serde(rename = "ResponseCode", default)]
    pub response_code: Option<String>,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: Option<String>,
    #[serde(rename = "CustomerMessage", default)]
    pub customer_message: Option<String>,
    #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(rename = "errorCode", default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(rename = "errorMessage", default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl StkPushResponse {
    pub fn is_accepted(&self) -> bool {
        self.response_code.as_deref().map(str::trim) == Some("0")
            && self
                .checkout_request_id
                .as_deref()
                .is_some_and(|id| !id.trim().is_empty())
    }

    pub fn rejection_message(&self) -> String {
        self.error_message
            .clone()
            .or_else(|| self.response_description.clone())
            .or_else(|| self.customer_message.clone())
            .unwrap_or_else(|| "payment request was rejected".to_string())
    }

    pub fn rejection_code(&self) -> Option<String> {
        self.error_code.clone().or_else(|| self.response_code.clone())
    }
}

/// Gateway acknowledgment of an accepted push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StkPushAck {
    pub merchant_request_id: Option<String>,
    pub checkout_request_id: String,
    pub response_code: String,
    pub response_description: Option<String>,
    pub customer_message: Option<String>,
}

// ---------------------------------------------------------------------------
// STK callback envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackEnvelope {
    #[serde(rename = "Body", default)]
    pub body: Option<CallbackBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback", default)]
    pub stk_callback: Option<StkCallback>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: Option<String>,
    #[serde(rename = "ResultCode", default)]
    pub result_code: Option<JsonValue>,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: Option<String>,
    #[serde(rename = "CallbackMetadata", default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

impl StkCallback {
    /// `ResultCode` is an integer on the wire; tolerate a numeric string.
    pub fn result_code(&self) -> Option<i64> {
        match self.result_code.as_ref()? {
            JsonValue::Number(n) => n.as_i64(),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn metadata_item(&self, name: &str) -> Option<&JsonValue> {
        self.callback_metadata.as_ref()?.find(name)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<CallbackItem>,
}

impl CallbackMetadata {
    pub fn find(&self, name: &str) -> Option<&JsonValue> {
        self.items
            .iter()
            .find(|item| item.name == name)
            .and_then(|item| item.value.as_ref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<JsonValue>,
}

/// Render a metadata value as text. Receipt numbers are strings, phone
/// numbers arrive as JSON numbers.
pub fn item_as_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn item_as_decimal(value: &JsonValue) -> Option<Decimal> {
    match value {
        JsonValue::Number(n) => n.to_string().parse().ok(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// The only response shape the gateway accepts from the callback receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackAckBody {
    #[serde(rename = "ResultCode")]
    pub result_code: i32,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_auth_response_expiry_accepts_string_and_number() {
        let as_string: AuthResponse =
            serde_json::from_value(json!({"access_token": "t", "expires_in": "3599"})).unwrap();
        assert_eq!(as_string.expires_in_secs(), Some(3599));

        let as_number: AuthResponse =
            serde_json::from_value(json!({"access_token": "t", "expires_in": 120})).unwrap();
        assert_eq!(as_number.expires_in_secs(), Some(120));
    }

    #[test]
    fn test_stk_push_request_uses_daraja_field_names() {
        let request = StkPushRequest {
            business_short_code: "174379".to_string(),
            password: "pw".to_string(),
            timestamp: "20260101120000".to_string(),
            transaction_type: TRANSACTION_TYPE_PAYBILL.to_string(),
            amount: "50".to_string(),
            party_a: "254712345678".to_string(),
            party_b: "174379".to_string(),
            phone_number: "254712345678".to_string(),
            callback_url: "https://example.com/mpesa/callback".to_string(),
            account_reference: "VoucherPurchase".to_string(),
            transaction_desc: "BuyVoucher".to_string(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["BusinessShortCode"], "174379");
        assert_eq!(value["CallBackURL"], "https://example.com/mpesa/callback");
        assert_eq!(value["TransactionType"], "CustomerPayBillOnline");
    }

    #[test]
    fn test_push_response_acceptance() {
        let accepted: StkPushResponse = serde_json::from_value(json!({
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": "ws_CO_191220191020363925",
            "ResponseCode": "0",
            "ResponseDescription": "Success. Request accepted for processing",
            "CustomerMessage": "Success. Request accepted for processing"
        }))
        .unwrap();
        assert!(accepted.is_accepted());

        let rejected: StkPushResponse = serde_json::from_value(json!({
            "requestId": "abc",
            "errorCode": "400.002.02",
            "errorMessage": "Bad Request - Invalid PhoneNumber"
        }))
        .unwrap();
        assert!(!rejected.is_accepted());
        assert_eq!(rejected.rejection_message(), "Bad Request - Invalid PhoneNumber");
        assert_eq!(rejected.rejection_code().as_deref(), Some("400.002.02"));
    }

    #[test]
    fn test_callback_metadata_lookup() {
        let envelope: CallbackEnvelope = serde_json::from_value(json!({
            "Body": {"stkCallback": {
                "MerchantRequestID": "m-1",
                "CheckoutRequestID": "ws_CO_1",
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {"Item": [
                    {"Name": "Amount", "Value": 50.00},
                    {"Name": "MpesaReceiptNumber", "Value": "ABC123"},
                    {"Name": "Balance"},
                    {"Name": "PhoneNumber", "Value": 254712345678u64}
                ]}
            }}
        }))
        .unwrap();

        let callback = envelope.body.unwrap().stk_callback.unwrap();
        assert_eq!(callback.result_code(), Some(0));
        assert_eq!(
            callback.metadata_item(RECEIPT_ITEM).and_then(item_as_string),
            Some("ABC123".to_string())
        );
        assert_eq!(
            callback.metadata_item(PHONE_ITEM).and_then(item_as_string),
            Some("254712345678".to_string())
        );
        assert_eq!(
            callback.metadata_item(AMOUNT_ITEM).and_then(item_as_decimal),
            Some(Decimal::new(50, 0))
        );
        assert!(callback.metadata_item("Balance").is_none());
    }

    #[test]
    fn test_result_code_tolerates_numeric_string() {
        let callback: StkCallback =
            serde_json::from_value(json!({"ResultCode": "1032"})).unwrap();
        assert_eq!(callback.result_code(), Some(1032));
    }
}
