//! The `owner` attribute view.

use std::collections::BTreeMap;

use crate::attr::AttrValue;
use crate::attr::AttributeProvider;
use crate::attr::UserPrincipal;
use crate::attr::check_not_create;
use crate::attr::type_mismatch;
use crate::attr::unknown_attribute;
use crate::error::Error;
use crate::error::Result;
use crate::file::File;

/// Default owner name when the configuration does not override it.
const DEFAULT_OWNER: &str = "user";

pub(crate) struct OwnerAttributeProvider;

impl AttributeProvider for OwnerAttributeProvider {
    fn name(&self) -> &'static str {
        "owner"
    }

    fn fixed_attributes(&self) -> &'static [&'static str] {
        &["owner"]
    }

    fn default_values(
        &self,
        user_defaults: &BTreeMap<String, AttrValue>,
    ) -> Result<Vec<(&'static str, AttrValue)>> {
        let owner = match user_defaults.get("owner:owner") {
            None => UserPrincipal::named(DEFAULT_OWNER),
            Some(AttrValue::Str(name)) => UserPrincipal::named(name.clone()),
            Some(AttrValue::User(user)) => user.clone(),
            Some(other) => {
                return Err(Error::IllegalArgument(format!(
                    "invalid default for 'owner:owner': expected a principal, got {}",
                    other.type_name()
                )));
            }
        };
        Ok(vec![("owner", AttrValue::User(owner))])
    }

    fn get(&self, file: &File, attr: &str) -> Option<AttrValue> {
        match attr {
            "owner" => file.attr("owner:owner"),
            _ => None,
        }
    }

    fn set(&self, file: &File, attr: &str, value: AttrValue, create: bool) -> Result<()> {
        match attr {
            "owner" => {
                check_not_create(self.name(), attr, create)?;
                let AttrValue::User(_) = &value else {
                    return Err(type_mismatch(self.name(), attr, "user-principal", &value));
                };
                file.set_attr("owner:owner", value);
                Ok(())
            }
            _ => Err(unknown_attribute(self.name(), attr)),
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use crate::attr::AttrValue;
    use crate::attr::AttributeProvider;
    use crate::attr::UserPrincipal;
    use crate::attr::owner::OwnerAttributeProvider;
    use crate::disk::HeapDisk;
    use crate::error::Error;
    use crate::file::File;
    use crate::time::FileTime;

    fn file() -> Arc<File> {
        let disk = Arc::new(HeapDisk::new(8, 64, 8));
        File::new_regular(1, disk, FileTime::EPOCH)
    }

    #[test]
    fn default_owner() {
        let p = OwnerAttributeProvider;
        let defaults = p.default_values(&BTreeMap::new()).unwrap();
        assert_eq!(
            vec![("owner", AttrValue::User(UserPrincipal::named("user")))],
            defaults
        );
    }

    #[test]
    fn set_and_get() {
        let p = OwnerAttributeProvider;
        let f = file();
        p.set(
            &f,
            "owner",
            AttrValue::User(UserPrincipal::named("root")),
            false,
        )
        .unwrap();
        assert_eq!(
            Some(AttrValue::User(UserPrincipal::named("root"))),
            p.get(&f, "owner")
        );
    }

    #[test]
    fn rejects_wrong_type_and_create() {
        let p = OwnerAttributeProvider;
        let f = file();
        let err = p
            .set(&f, "owner", AttrValue::Str("root".to_owned()), false)
            .unwrap_err();
        assert!(matches!(err, Error::IllegalArgument(_)));
        let err = p
            .set(
                &f,
                "owner",
                AttrValue::User(UserPrincipal::named("root")),
                true,
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation(_)));
    }
}
