//! Function trait for provider-defined functions
//!
//! Arguments are decoded and checked against the definition before `call`
//! runs: argument count, nulls and unknowns are handled by the framework.
//! A variadic tail arrives as a single tuple argument.

use crate::context::Context;
use crate::schema::FunctionDefinition;
use crate::types::FunctionError;
use crate::value::Value;
use async_trait::async_trait;

#[async_trait]
pub trait Function: Send + Sync {
    /// Get function definition (parameters, return type)
    async fn definition(
        &self,
        ctx: Context,
        request: FunctionDefinitionRequest,
    ) -> FunctionDefinitionResponse;

    /// Execute the function
    async fn call(&self, ctx: Context, request: CallFunctionRequest) -> CallFunctionResponse;
}

pub struct FunctionDefinitionRequest;

pub struct FunctionDefinitionResponse {
    pub definition: FunctionDefinition,
}

pub struct CallFunctionRequest {
    pub name: String,
    /// One value per fixed parameter, then a tuple for the variadic tail
    /// when the definition has one
    pub arguments: Vec<Value>,
}

pub struct CallFunctionResponse {
    pub result: Result<Value, FunctionError>,
}

impl CallFunctionResponse {
    pub fn ok(value: Value) -> Self {
        Self { result: Ok(value) }
    }

    pub fn error(error: FunctionError) -> Self {
        Self { result: Err(error) }
    }
}
