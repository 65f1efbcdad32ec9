/// One package metadata entry, e.g. a title, creator, or subject. The same
/// tag may repeat (several creators), so fields stay an ordered list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataField {
    pub tag_name: String,
    pub text: String,
}

impl MetadataField {
    pub fn new(tag_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            text: text.into(),
        }
    }
}
