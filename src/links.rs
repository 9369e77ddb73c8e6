use serde::Serialize;

const LETTERBOXD_SEARCH: &str = "https://letterboxd.com/search/films/";
const DOUBAN_SEARCH: &str = "https://www.douban.com/search?cat=1002&q=";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Links {
    pub letterboxd_url: String,
    pub douban_url: String,
}

/// Search-query links for a title. Nothing is resolved over the network.
pub fn links(title: &str) -> Option<Links> {
    let title = title.trim();
    if title.is_empty() {
        return None;
    }
    let query = urlencoding::encode(title);
    Some(Links {
        letterboxd_url: format!("{LETTERBOXD_SEARCH}{query}/"),
        douban_url: format!("{DOUBAN_SEARCH}{query}"),
    })
}
