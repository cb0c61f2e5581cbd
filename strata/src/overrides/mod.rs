//! The CLI override grammar: one line in, one [`Override`] record out.

mod functions;
mod parser;
mod types;

pub use functions::{CallArg, CallResult, FunctionCall, Functions, Param, ParamType, UserFn};
pub use parser::{parse_override, parse_overrides};
pub use types::{
  ChoiceSweep, GlobSweep, IntervalSweep, ListMutation, ListOperation, Override, OverrideType,
  OverrideValue, RangeSweep, Sweep, ValueType,
};
