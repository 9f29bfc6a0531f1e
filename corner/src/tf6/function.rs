//! Function returning its dynamic argument unchanged

use async_trait::async_trait;
use plugkit::lowlevel::{Call, FunctionHandler};
use plugkit::schema::{FunctionDefinition, Parameter};
use plugkit::types::FunctionError;
use plugkit::value::{Type, Value};

pub struct DynamicFunction;

#[async_trait]
impl FunctionHandler for DynamicFunction {
    fn definition(&self) -> FunctionDefinition {
        FunctionDefinition::new(Type::Dynamic)
            .summary("Returns its argument, keeping its type")
            .parameter(Parameter::new("input", Type::Dynamic).allow_null())
    }

    async fn call(&self, _call: &Call, arguments: Vec<Value>) -> Result<Value, FunctionError> {
        arguments
            .into_iter()
            .next()
            .ok_or_else(|| FunctionError::argument(0, "missing argument"))
    }
}
