//! Declarative macros for building parameter lists.

/// Build a `Vec<Param>` from `name => value` pairs.
///
/// Values go through `Value::from`, so any supported Rust type works,
/// including `Option<T>` for NULL.
///
/// # Example
///
/// ```
/// use mysql_helper::params;
///
/// let params = params! { "id" => 7, "name" => "ada", "left_at" => None::<i64> };
/// assert_eq!(params.len(), 3);
/// assert_eq!(params[0].name, "id");
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::models::Param>::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {
        vec![
            $(
                $crate::models::Param::new($name, $crate::models::Value::from($value)),
            )+
        ]
    };
}

#[cfg(test)]
mod tests {
    use crate::models::Value;

    #[test]
    fn test_params_macro() {
        let list = params! { "a" => 1, "@b" => "x", "c" => None::<f64> };
        assert_eq!(list.len(), 3);
        assert_eq!(list[1].name, "b");
        assert_eq!(list[1].value, Value::from("x"));
        assert!(list[2].value.is_null());
    }

    #[test]
    fn test_params_macro_empty() {
        let list = params! {};
        assert!(list.is_empty());
    }
}
