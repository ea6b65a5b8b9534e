// Route path constants - single source of truth for all API paths

pub const PING: &str = "/ping";
pub const GET: &str = "/get";
pub const DEL: &str = "/del";
pub const SET: &str = "/set";

pub const SWAGGER_UI: &str = "/swagger-ui";
pub const OPENAPI_JSON: &str = "/api-docs/openapi.json";
