/// unwrap a diesel result, turning `NotFound` into `Error::NotFound` and
/// logging every other database error under the given target before
/// returning it.
macro_rules! db_handle_get_error {
    ( $data:expr, $target:expr, $type_str:expr) => {
        match $data {
            Ok(e) => e,
            Err(diesel::result::Error::NotFound) => {
                return Err($crate::errors::Error::NotFound {
                    what: format!("{}", $type_str),
                });
            }
            Err(error) => {
                error!(target:$target, "Error getting {}. (error: {})", $type_str, error);
                return Err($crate::errors::Error::from(error));
            }
        }
    }
}

/// same as `db_handle_get_error` for writes, where `NotFound` is not expected
/// and every error is logged.
macro_rules! db_handle_write_error {
    ( $data:expr, $target:expr, $type_str:expr) => {
        match $data {
            Ok(e) => e,
            Err(error) => {
                error!(target:$target, "Error writing {}. (error: {})", $type_str, error);
                return Err($crate::errors::Error::from(error));
            }
        }
    }
}

pub(crate) use db_handle_get_error;
pub(crate) use db_handle_write_error;
