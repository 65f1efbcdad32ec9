/// One table-of-contents entry. `href` and `fragment` locate the target
/// document; `id` is the entry's own identifier in the navigation source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Toc {
    pub title: String,
    pub href: Option<String>,
    pub fragment: Option<String>,
    pub id: Option<String>,
    pub children: Vec<Toc>,
}

impl Toc {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}
