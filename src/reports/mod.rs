//! Report assemblers: one module per report family, each orchestrating
//! the tracker/code-host queries, the aggregation core and the rendering
//! into a publishable document.

pub mod daily;
pub mod release;
pub mod weekly;
