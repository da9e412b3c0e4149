/// Directory prefix under which a bucket's object content lives on a mountpath.
pub const OBJ_CONTENT_DIR: &str = "%ob";

pub const SMAP_FNAME: &str = ".stratus.smap";
pub const BMD_FNAME: &str = ".stratus.bmd";

pub const HEADER_CALLER_ID: &str = "x-caller-id";
pub const HEADER_CALLER_NAME: &str = "x-caller-name";

pub const URL_PARAM_UUID: &str = "uuid";
pub const URL_PARAM_TXN_TIMEOUT: &str = "tx-timeout";
pub const URL_PARAM_WAIT_METASYNC: &str = "wait-metasync";
pub const URL_PARAM_NOTIFY: &str = "notify";
pub const URL_PARAM_WHAT: &str = "what";

pub const WHAT_IC_BUNDLE: &str = "ic-bundle";

/// Marker in the `notify` query parameter meaning "notify the current IC members".
pub const NOTIFY_IC: &str = "ic";
