//! Instrumentation commands
//!
//! Every call into the tracker, queued or direct, becomes a [`Command`].
//! Hosts that only know method names and positional JSON arguments go
//! through [`Command::from_call`]; names outside the known set become
//! [`Command::Unrecognized`] so they can be reported without stopping
//! anything else.

use serde_json::Value;

use crate::error::{Error, Result};

/// Event name sent on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Pageview,
    CustomEvent,
    ViewItem,
    AddToCart,
    Checkout,
    Purchase,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Pageview => "pageview",
            EventType::CustomEvent => "custom_event",
            EventType::ViewItem => "view_item",
            EventType::AddToCart => "add_to_cart",
            EventType::Checkout => "checkout",
            EventType::Purchase => "purchase",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A monetary figure.
///
/// Numeric strings keep their exact text on the wire, so `"19.50"` is sent
/// as `19.50`. Plain numbers render in their shortest form: `1.0` as `1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Amount {
    value: f64,
    text: Option<String>,
}

impl Amount {
    /// Parse a numeric string, keeping its trimmed text
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let value: f64 = text.parse().ok()?;
        if !value.is_finite() {
            return None;
        }
        Some(Self {
            value,
            text: Some(text.to_string()),
        })
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

impl From<f64> for Amount {
    fn from(value: f64) -> Self {
        Self { value, text: None }
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.text {
            Some(text) => f.write_str(text),
            None => write!(f, "{}", self.value),
        }
    }
}

/// Items plus their total, shared by cart and checkout events
#[derive(Debug, Clone, PartialEq)]
pub struct Cart {
    pub items: Value,
    pub value: Amount,
    pub currency: String,
}

/// A completed purchase
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub items: Value,
    pub value: Amount,
    pub currency: String,
    pub tax: Amount,
    pub shipping: Amount,
    pub transaction_id: String,
}

/// One tracker operation
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Pageview,
    CustomEvent { name: String, params: Value },
    ViewItem { items: Value },
    AddToCart(Cart),
    Checkout(Cart),
    Purchase(Order),
    /// A method name the tracker does not implement
    Unrecognized(String),
}

impl Command {
    /// Map a method name and positional arguments onto a command.
    ///
    /// | Method | Arguments |
    /// |--------|-----------|
    /// | `pageview` | none |
    /// | `customEvent` | name, params (defaults to `{}`) |
    /// | `viewItem` | items |
    /// | `addToCart`, `checkout` | items, value, currency |
    /// | `purchase` | items, value, currency, tax, shipping, transactionId |
    ///
    /// Numbers may be given as JSON numbers or numeric strings.
    pub fn from_call(method: &str, args: &[Value]) -> Result<Self> {
        let args = Args { method, args };
        let command = match method {
            "pageview" => Command::Pageview,
            "customEvent" => Command::CustomEvent {
                name: args.string(0, "eventName")?,
                params: args.get(1).cloned().unwrap_or_else(|| serde_json::json!({})),
            },
            "viewItem" => Command::ViewItem {
                items: args.items(0)?,
            },
            "addToCart" => Command::AddToCart(args.cart()?),
            "checkout" => Command::Checkout(args.cart()?),
            "purchase" => Command::Purchase(Order {
                items: args.items(0)?,
                value: args.number(1, "value")?,
                currency: args.string(2, "currency")?,
                tax: args.number(3, "tax")?,
                shipping: args.number(4, "shipping")?,
                transaction_id: args.string(5, "transactionId")?,
            }),
            other => Command::Unrecognized(other.to_string()),
        };
        Ok(command)
    }

    /// Wire event type, `None` for unrecognized commands
    pub fn event_type(&self) -> Option<EventType> {
        match self {
            Command::Pageview => Some(EventType::Pageview),
            Command::CustomEvent { .. } => Some(EventType::CustomEvent),
            Command::ViewItem { .. } => Some(EventType::ViewItem),
            Command::AddToCart(_) => Some(EventType::AddToCart),
            Command::Checkout(_) => Some(EventType::Checkout),
            Command::Purchase(_) => Some(EventType::Purchase),
            Command::Unrecognized(_) => None,
        }
    }
}

/// Positional argument accessors that name the failing argument
struct Args<'a> {
    method: &'a str,
    args: &'a [Value],
}

impl Args<'_> {
    fn get(&self, index: usize) -> Option<&Value> {
        self.args.get(index).filter(|v| !v.is_null())
    }

    fn invalid(&self, message: String) -> Error {
        Error::InvalidArguments {
            method: self.method.to_string(),
            message,
        }
    }

    fn items(&self, index: usize) -> Result<Value> {
        self.get(index)
            .cloned()
            .ok_or_else(|| self.invalid("missing items".to_string()))
    }

    fn string(&self, index: usize, name: &str) -> Result<String> {
        match self.get(index) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(other) => Err(self.invalid(format!("{} must be a string, got {}", name, other))),
            None => Err(self.invalid(format!("missing {}", name))),
        }
    }

    fn number(&self, index: usize, name: &str) -> Result<Amount> {
        match self.get(index) {
            Some(Value::Number(n)) => n
                .as_f64()
                .map(Amount::from)
                .ok_or_else(|| self.invalid(format!("{} is out of range", name))),
            Some(Value::String(s)) => Amount::parse(s)
                .ok_or_else(|| self.invalid(format!("{} must be numeric, got {:?}", name, s))),
            Some(other) => Err(self.invalid(format!("{} must be a number, got {}", name, other))),
            None => Err(self.invalid(format!("missing {}", name))),
        }
    }

    fn cart(&self) -> Result<Cart> {
        Ok(Cart {
            items: self.items(0)?,
            value: self.number(1, "value")?,
            currency: self.string(2, "currency")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_methods() {
        assert_eq!(Command::from_call("pageview", &[]).unwrap(), Command::Pageview);

        assert_eq!(
            Command::from_call("customEvent", &[json!("signup"), json!({"plan": "pro"})]).unwrap(),
            Command::CustomEvent {
                name: "signup".to_string(),
                params: json!({"plan": "pro"}),
            }
        );

        assert_eq!(
            Command::from_call("addToCart", &[json!([{"id": "a"}]), json!("19.5"), json!("EUR")])
                .unwrap(),
            Command::AddToCart(Cart {
                items: json!([{"id": "a"}]),
                value: Amount::parse("19.5").unwrap(),
                currency: "EUR".to_string(),
            })
        );

        let purchase = Command::from_call(
            "purchase",
            &[
                json!([{"id": "sku1"}]),
                json!(9.99),
                json!("USD"),
                json!(1.0),
                json!(2.0),
                json!("T1"),
            ],
        )
        .unwrap();
        assert_eq!(purchase.event_type(), Some(EventType::Purchase));
        match purchase {
            Command::Purchase(order) => {
                assert_eq!(order.transaction_id, "T1");
                assert_eq!(order.value.value(), 9.99);
                assert_eq!(order.tax, Amount::from(1.0));
                assert_eq!(order.shipping.to_string(), "2");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_custom_event_params_default() {
        assert_eq!(
            Command::from_call("customEvent", &[json!("ping")]).unwrap(),
            Command::CustomEvent {
                name: "ping".to_string(),
                params: json!({}),
            }
        );
    }

    #[test]
    fn test_unknown_method_is_unrecognized() {
        let command = Command::from_call("trackEverything", &[json!(1)]).unwrap();
        assert_eq!(command, Command::Unrecognized("trackEverything".to_string()));
        assert_eq!(command.event_type(), None);
    }

    #[test]
    fn test_invalid_arguments_name_the_argument() {
        let err = Command::from_call("checkout", &[json!([]), json!("lots"), json!("USD")])
            .unwrap_err();
        assert!(err.to_string().contains("checkout"));
        assert!(err.to_string().contains("value"));

        let err = Command::from_call("viewItem", &[]).unwrap_err();
        assert!(err.to_string().contains("missing items"));

        let err = Command::from_call("customEvent", &[json!({"not": "a name"})]).unwrap_err();
        assert!(err.to_string().contains("eventName"));
    }

    #[test]
    fn test_numeric_strings_keep_their_text() {
        let command = Command::from_call(
            "purchase",
            &[
                json!([]),
                json!(" 19.50 "),
                json!("USD"),
                json!("0"),
                json!(3.10),
                json!("T2"),
            ],
        )
        .unwrap();
        let Command::Purchase(order) = command else {
            panic!("expected a purchase");
        };
        assert_eq!(order.value.to_string(), "19.50");
        assert_eq!(order.value.value(), 19.5);
        assert_eq!(order.tax.to_string(), "0");
        assert_eq!(order.shipping.to_string(), "3.1");

        assert_eq!(Amount::parse("1e3").unwrap().to_string(), "1e3");
        assert_eq!(Amount::parse("NaN"), None);
        assert_eq!(Amount::parse(""), None);
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(EventType::Pageview.as_str(), "pageview");
        assert_eq!(EventType::CustomEvent.to_string(), "custom_event");
        assert_eq!(EventType::ViewItem.as_str(), "view_item");
        assert_eq!(EventType::AddToCart.as_str(), "add_to_cart");
        assert_eq!(EventType::Checkout.as_str(), "checkout");
    }
}
