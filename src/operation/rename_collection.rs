use bson::doc;

use crate::{
    cmap::{Command, CommandResponse, StreamDescription},
    concern::WriteConcern,
    error::Result,
    operation::Operation,
};

/// Renames a collection within a database. The command itself always targets
/// the `admin` database; the handle layer enforces that only an `admin`
/// handle may issue it.
#[derive(Debug)]
pub(crate) struct RenameCollection {
    db: String,
    from: String,
    to: String,
    drop_target: bool,
    write_concern: Option<WriteConcern>,
}

impl RenameCollection {
    pub(crate) fn new(
        db: String,
        from: String,
        to: String,
        drop_target: bool,
        write_concern: Option<WriteConcern>,
    ) -> Self {
        Self {
            db,
            from,
            to,
            drop_target,
            write_concern,
        }
    }
}

impl Operation for RenameCollection {
    type O = ();

    const NAME: &'static str = "renameCollection";

    fn build(&self, _description: &StreamDescription) -> Result<Command> {
        let mut body = doc! {
            Self::NAME: format!("{}.{}", self.db, self.from),
            "to": format!("{}.{}", self.db, self.to),
        };
        if self.drop_target {
            body.insert("dropTarget", true);
        }
        if let Some(ref write_concern) = self.write_concern {
            if !write_concern.is_empty() {
                body.insert("writeConcern", write_concern.to_document());
            }
        }

        Ok(Command::new(Self::NAME, "admin", body))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        response.validate()
    }

    fn is_write(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod test {
    use bson::doc;
    use pretty_assertions::assert_eq;

    use super::RenameCollection;
    use crate::{
        cmap::StreamDescription,
        operation::{test::response_from, Operation},
    };

    #[test]
    fn build_targets_admin() {
        let op = RenameCollection::new(
            "app".to_string(),
            "a".to_string(),
            "b".to_string(),
            false,
            None,
        );
        let command = op.build(&StreamDescription::new_testing()).unwrap();
        assert_eq!(command.target_db, "admin");
        assert_eq!(
            command.body,
            doc! { "renameCollection": "app.a", "to": "app.b" }
        );
    }

    #[test]
    fn existing_target_surfaces() {
        let op = RenameCollection::new(
            "app".to_string(),
            "a".to_string(),
            "b".to_string(),
            false,
            None,
        );
        let err = op
            .handle_response(response_from(doc! {
                "ok": 0.0,
                "code": 48,
                "codeName": "NamespaceExists",
                "errmsg": "target namespace exists",
            }))
            .unwrap_err();
        assert_eq!(err.code(), Some(48));
    }
}
