//! The `user` attribute view: arbitrary byte-valued extended attributes.

use crate::attr::AttrValue;
use crate::attr::AttributeProvider;
use crate::attr::check_not_create;
use crate::attr::type_mismatch;
use crate::error::Result;
use crate::file::File;

pub(crate) struct UserDefinedAttributeProvider;

impl AttributeProvider for UserDefinedAttributeProvider {
    fn name(&self) -> &'static str {
        "user"
    }

    fn inherits(&self) -> &'static [&'static str] {
        &["basic"]
    }

    /// No fixed names: any attribute that has been stored exists.
    fn fixed_attributes(&self) -> &'static [&'static str] {
        &[]
    }

    fn supports(&self, _attr: &str) -> bool {
        true
    }

    fn get(&self, file: &File, attr: &str) -> Option<AttrValue> {
        file.attr(&format!("user:{attr}"))
    }

    fn set(&self, file: &File, attr: &str, value: AttrValue, create: bool) -> Result<()> {
        check_not_create(self.name(), attr, create)?;
        let AttrValue::Bytes(_) = &value else {
            return Err(type_mismatch(self.name(), attr, "bytes", &value));
        };
        file.set_attr(format!("user:{attr}"), value);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::attr::AttrValue;
    use crate::attr::AttributeProvider;
    use crate::attr::user::UserDefinedAttributeProvider;
    use crate::disk::HeapDisk;
    use crate::error::Error;
    use crate::file::File;
    use crate::time::FileTime;

    fn file() -> Arc<File> {
        let disk = Arc::new(HeapDisk::new(8, 64, 8));
        File::new_regular(1, disk, FileTime::EPOCH)
    }

    #[test]
    fn arbitrary_names_round_trip() {
        let p = UserDefinedAttributeProvider;
        let f = file();
        assert_eq!(None, p.get(&f, "mime-type"));
        p.set(
            &f,
            "mime-type",
            AttrValue::Bytes(b"text/plain".to_vec()),
            false,
        )
        .unwrap();
        assert_eq!(
            Some(AttrValue::Bytes(b"text/plain".to_vec())),
            p.get(&f, "mime-type")
        );
    }

    #[test]
    fn only_bytes_are_accepted() {
        let p = UserDefinedAttributeProvider;
        let err = p
            .set(&file(), "x", AttrValue::Str("nope".to_owned()), false)
            .unwrap_err();
        assert!(matches!(err, Error::IllegalArgument(_)));
    }

    #[test]
    fn not_settable_on_create() {
        let p = UserDefinedAttributeProvider;
        let err = p
            .set(&file(), "x", AttrValue::Bytes(vec![1]), true)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation(_)));
    }
}
