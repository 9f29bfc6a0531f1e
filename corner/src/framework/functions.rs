//! Provider-defined functions

use async_trait::async_trait;
use plugkit::context::Context;
use plugkit::function::{
    CallFunctionRequest, CallFunctionResponse, Function, FunctionDefinitionRequest,
    FunctionDefinitionResponse,
};
use plugkit::schema::{FunctionDefinition, Parameter};
use plugkit::types::FunctionError;
use plugkit::value::number::{parse, to_f32};
use plugkit::value::{Type, Value};

/// Returns its boolean argument.
pub struct BoolFunction;

#[async_trait]
impl Function for BoolFunction {
    async fn definition(
        &self,
        _ctx: Context,
        _request: FunctionDefinitionRequest,
    ) -> FunctionDefinitionResponse {
        FunctionDefinitionResponse {
            definition: FunctionDefinition::new(Type::Bool)
                .summary("Echoes a boolean")
                .parameter(Parameter::new("input", Type::Bool)),
        }
    }

    async fn call(&self, _ctx: Context, request: CallFunctionRequest) -> CallFunctionResponse {
        match request.arguments.first().and_then(Value::as_bool) {
            Some(b) => CallFunctionResponse::ok(Value::from(b)),
            None => CallFunctionResponse::error(FunctionError::argument(0, "expected a bool")),
        }
    }
}

/// Joins any number of strings with a separator.
pub struct ConcatFunction;

#[async_trait]
impl Function for ConcatFunction {
    async fn definition(
        &self,
        _ctx: Context,
        _request: FunctionDefinitionRequest,
    ) -> FunctionDefinitionResponse {
        FunctionDefinitionResponse {
            definition: FunctionDefinition::new(Type::String)
                .summary("Joins strings with a separator")
                .parameter(Parameter::new("separator", Type::String))
                .variadic(Parameter::new("parts", Type::String)),
        }
    }

    async fn call(&self, _ctx: Context, request: CallFunctionRequest) -> CallFunctionResponse {
        let Some(separator) = request.arguments.first().and_then(Value::as_str) else {
            return CallFunctionResponse::error(FunctionError::argument(0, "expected a string"));
        };
        let parts = request
            .arguments
            .get(1)
            .and_then(Value::elements)
            .unwrap_or_default();
        let mut joined = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            match part.as_str() {
                Some(s) => joined.push(s),
                None => {
                    return CallFunctionResponse::error(FunctionError::argument(
                        i + 1,
                        "expected a string",
                    ))
                }
            }
        }
        CallFunctionResponse::ok(Value::from(joined.join(separator)))
    }
}

/// Narrows a number to 32-bit precision.
pub struct Float32Function;

#[async_trait]
impl Function for Float32Function {
    async fn definition(
        &self,
        _ctx: Context,
        _request: FunctionDefinitionRequest,
    ) -> FunctionDefinitionResponse {
        FunctionDefinitionResponse {
            definition: FunctionDefinition::new(Type::Number)
                .summary("Rounds a number to the nearest 32-bit float")
                .parameter(Parameter::new("number", Type::Number)),
        }
    }

    async fn call(&self, _ctx: Context, request: CallFunctionRequest) -> CallFunctionResponse {
        let Some(n) = request.arguments.first().and_then(Value::as_number) else {
            return CallFunctionResponse::error(FunctionError::argument(0, "expected a number"));
        };
        let narrowed = match to_f32(n) {
            Ok(f) => f,
            Err(e) => return CallFunctionResponse::error(FunctionError::argument(0, e.to_string())),
        };
        match parse(&f64::from(narrowed).to_string()) {
            Ok(n) => CallFunctionResponse::ok(Value::Number(n)),
            Err(e) => CallFunctionResponse::error(FunctionError::new(e.to_string())),
        }
    }
}
