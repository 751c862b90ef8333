// path constants
pub const PATH_SEPARATOR: &str = "/";
pub const FIELD_SEPARATOR: &str = ".";

// query parameter names
pub const PARAM_WHERE: &str = "where";
pub const PARAM_ORDER_BY: &str = "orderBy";
pub const PARAM_START_AT: &str = "startAt";
pub const PARAM_START_AFTER: &str = "startAfter";
pub const PARAM_START_AT_DOCUMENT: &str = "startAtDocument";
pub const PARAM_START_AFTER_DOCUMENT: &str = "startAfterDocument";
pub const PARAM_END_AT: &str = "endAt";
pub const PARAM_END_AFTER: &str = "endAfter";
pub const PARAM_END_AT_DOCUMENT: &str = "endAtDocument";
pub const PARAM_END_AFTER_DOCUMENT: &str = "endAfterDocument";
pub const PARAM_LIMIT: &str = "limit";

// document cursor keys
pub const CURSOR_DOC_PATH: &str = "path";
pub const CURSOR_DOC_DATA: &str = "data";

// pseudo-field addressing a document by its full path
pub const DOCUMENT_PATH_FIELD: &str = "__name__";
