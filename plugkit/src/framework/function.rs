use crate::context::Context;
use crate::function::{CallFunctionRequest, Function, FunctionDefinitionRequest};
use crate::lowlevel::{Call, FunctionHandler};
use crate::provider::FunctionFactory;
use crate::schema::FunctionDefinition;
use crate::types::FunctionError;
use crate::value::Value;
use async_trait::async_trait;
use tracing::debug;

pub(super) struct FunctionAdapter {
    name: String,
    factory: FunctionFactory,
    definition: FunctionDefinition,
}

impl FunctionAdapter {
    pub(super) async fn new(ctx: &Context, name: &str, factory: FunctionFactory) -> Self {
        let definition = factory()
            .definition(ctx.clone(), FunctionDefinitionRequest)
            .await
            .definition;
        Self {
            name: name.to_string(),
            factory,
            definition,
        }
    }
}

/// Packs arguments past the fixed parameters into one tuple.
fn pack_variadic(definition: &FunctionDefinition, mut arguments: Vec<Value>) -> Vec<Value> {
    if definition.variadic_parameter.is_none() {
        return arguments;
    }
    let fixed = definition.parameters.len().min(arguments.len());
    let tail = arguments.split_off(fixed);
    arguments.push(Value::tuple(tail));
    arguments
}

#[async_trait]
impl FunctionHandler for FunctionAdapter {
    fn definition(&self) -> FunctionDefinition {
        self.definition.clone()
    }

    async fn call(&self, call: &Call, arguments: Vec<Value>) -> Result<Value, FunctionError> {
        debug!(function = %self.name, arguments = arguments.len(), "calling function");
        let function = (self.factory)();
        let response = function
            .call(
                call.ctx.clone(),
                CallFunctionRequest {
                    name: self.name.clone(),
                    arguments: pack_variadic(&self.definition, arguments),
                },
            )
            .await;
        response.result
    }
}
