#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use vertica_client::{LoginParams, Value};

/// Arbitrary argument for the dynamic login shapes.
#[derive(Debug, Arbitrary)]
enum FuzzValue {
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl From<FuzzValue> for Value {
    fn from(v: FuzzValue) -> Self {
        match v {
            FuzzValue::Nil => Value::Nil,
            FuzzValue::Bool(b) => Value::Bool(b),
            FuzzValue::Int(n) => Value::Int(n),
            FuzzValue::Str(s) => Value::Str(s),
        }
    }
}

fuzz_target!(|args: Vec<FuzzValue>| {
    let args: Vec<Value> = args.into_iter().map(Value::from).collect();
    if let Ok(params) = LoginParams::resolve(&args) {
        let _ = params.to_config();
    }
});
