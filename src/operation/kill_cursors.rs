use bson::doc;

use crate::{
    cmap::{Command, CommandResponse, StreamDescription},
    coll::Namespace,
    error::Result,
    operation::Operation,
};

#[derive(Debug)]
pub(crate) struct KillCursors {
    ns: Namespace,
    cursor_ids: Vec<i64>,
}

impl KillCursors {
    pub(crate) fn new(ns: Namespace, cursor_ids: Vec<i64>) -> Self {
        Self { ns, cursor_ids }
    }
}

impl Operation for KillCursors {
    type O = ();

    const NAME: &'static str = "killCursors";

    fn build(&self, _description: &StreamDescription) -> Result<Command> {
        let body = doc! {
            Self::NAME: self.ns.coll.clone(),
            "cursors": self.cursor_ids.clone(),
        };

        Ok(Command::new(Self::NAME, self.ns.db.clone(), body))
    }

    fn handle_response(&self, response: CommandResponse) -> Result<Self::O> {
        response.validate()
    }
}

#[cfg(test)]
mod test {
    use bson::doc;
    use pretty_assertions::assert_eq;

    use super::KillCursors;
    use crate::{cmap::StreamDescription, coll::Namespace, operation::Operation};

    #[test]
    fn build() {
        let op = KillCursors::new(
            Namespace {
                db: "app".to_string(),
                coll: "events".to_string(),
            },
            vec![42],
        );
        let command = op.build(&StreamDescription::new_testing()).unwrap();
        assert_eq!(
            command.body,
            doc! { "killCursors": "events", "cursors": [42_i64] }
        );
    }
}
