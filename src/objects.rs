//! Objects shared by the demo server.

use serde_json::{Value, json};
use thingbus_server::{CallArgs, MethodError, Shareable, SharedMethod};

/// Plain arithmetic, no critical section.
#[derive(Debug, Default)]
pub struct Calculator;

impl Calculator {
    fn add(&mut self, args: &CallArgs) -> Result<Value, MethodError> {
        let a: i64 = args.get(0, "a")?;
        let b: i64 = args.get(1, "b")?;
        Ok(json!(a + b))
    }
}

impl Shareable for Calculator {
    fn shared_methods() -> &'static [SharedMethod<Self>] {
        static METHODS: &[SharedMethod<Calculator>] =
            &[SharedMethod::new("add", "(a, b)", "Add two numbers.", Calculator::add)];
        METHODS
    }
}

/// A calculator that must be initialized before use and finalized after.
/// Between the two, only the initializing client may use it.
#[derive(Debug, Default)]
pub struct LockedCalculator {
    initialized: bool,
    total: i64,
}

impl LockedCalculator {
    fn initialize(&mut self, _args: &CallArgs) -> Result<Value, MethodError> {
        self.initialized = true;
        self.total = 0;
        Ok(Value::Null)
    }

    fn add(&mut self, args: &CallArgs) -> Result<Value, MethodError> {
        let a: i64 = args.get(0, "a")?;
        let b: i64 = args.get(1, "b")?;
        if !self.initialized {
            return Err(anyhow::anyhow!("calculator is not initialized").into());
        }
        self.total += a + b;
        Ok(json!(a + b))
    }

    fn finalize(&mut self, _args: &CallArgs) -> Result<Value, MethodError> {
        self.initialized = false;
        Ok(json!(std::mem::take(&mut self.total)))
    }
}

impl Shareable for LockedCalculator {
    fn shared_methods() -> &'static [SharedMethod<Self>] {
        static METHODS: &[SharedMethod<LockedCalculator>] = &[
            SharedMethod::new("initialize", "()", "Initialize the class.", LockedCalculator::initialize)
                .acquires(),
            SharedMethod::new("add", "(a, b)", "Add two numbers.", LockedCalculator::add).requires(),
            SharedMethod::new(
                "finalize",
                "()",
                "Finalize the class and return the running total.",
                LockedCalculator::finalize,
            )
            .releases(),
        ];
        METHODS
    }
}
