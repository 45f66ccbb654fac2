use bson::{Bson, Document};

/// Coerces a numeric BSON value to an `i64`, if it is one.
pub(crate) fn get_int(val: &Bson) -> Option<i64> {
    match *val {
        Bson::Int32(i) => Some(i64::from(i)),
        Bson::Int64(i) => Some(i),
        Bson::Double(f) if (f - (f as i64 as f64)).abs() <= f64::EPSILON => Some(f as i64),
        _ => None,
    }
}

/// The first key of a document, e.g. the stage name of a compiled
/// aggregation pipeline stage.
pub(crate) fn first_key(document: &Document) -> Option<&str> {
    document.keys().next().map(String::as_str)
}

#[cfg(test)]
mod test {
    use bson::{doc, Bson};

    use super::{first_key, get_int};

    #[test]
    fn int_coercion() {
        assert_eq!(get_int(&Bson::Int32(5)), Some(5));
        assert_eq!(get_int(&Bson::Int64(5)), Some(5));
        assert_eq!(get_int(&Bson::Double(1.0)), Some(1));
        assert_eq!(get_int(&Bson::Double(1.5)), None);
        assert_eq!(get_int(&Bson::String("1".to_string())), None);
    }

    #[test]
    fn first_key_of_stage() {
        assert_eq!(first_key(&doc! { "$match": {}, "x": 1 }), Some("$match"));
        assert_eq!(first_key(&doc! {}), None);
    }
}
