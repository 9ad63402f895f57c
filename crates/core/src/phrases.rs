use anyhow::Context;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhraseBook {
    #[serde(default)]
    pub phrases: Vec<Phrase>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phrase {
    pub format: String,
    #[serde(rename = "type")]
    pub kind: PhraseKind,
    #[serde(default)]
    pub char: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhraseKind {
    Percentage,
    RepeatCharOutOf10,
    OutOf5,
    OutOf10,
    #[serde(other)]
    Fallback,
}

/// Inputs for one reply.
#[derive(Debug, Clone, Copy)]
pub struct ReplyContext<'a> {
    pub handle: &'a str,
    pub subject_tag: &'a str,
    pub site_url: &'a str,
    pub item_id: &'a str,
    pub meltdown_pct: i32,
    pub average_score: f64,
    pub trending_toward_meltdown: bool,
}

impl PhraseBook {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read(path)
            .with_context(|| format!("failed to read phrase file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("invalid phrase file {}", path.display()))
    }

    pub fn from_json(raw: &[u8]) -> anyhow::Result<Self> {
        Ok(serde_json::from_slice(raw)?)
    }

    /// Picks a template uniformly at random and fills it for `meltdown_pct`.
    pub fn intro(&self, meltdown_pct: i32, rng: &mut (dyn RngCore + Send)) -> String {
        if self.phrases.is_empty() {
            return fallback_sentence(meltdown_pct);
        }
        let idx = rng.gen_range(0..self.phrases.len());
        self.phrases[idx].render(meltdown_pct)
    }

    pub fn compose_reply(&self, ctx: &ReplyContext<'_>, rng: &mut (dyn RngCore + Send)) -> String {
        let mut status = self.intro(ctx.meltdown_pct, rng);
        status.push_str("  ");
        status.push_str(&editorial_clause(
            ctx.subject_tag,
            ctx.average_score,
            ctx.trending_toward_meltdown,
        ));

        format!(
            "@{} {}\nCheck it out here: {}?id={}",
            ctx.handle,
            status,
            ctx.site_url.trim_end_matches('/'),
            ctx.item_id
        )
    }
}

impl Phrase {
    pub fn render(&self, meltdown_pct: i32) -> String {
        match self.kind {
            PhraseKind::Percentage => fill(&self.format, &meltdown_pct.to_string()),
            PhraseKind::RepeatCharOutOf10 => fill(&self.format, &self.char.repeat(out_of(meltdown_pct, 10))),
            PhraseKind::OutOf5 => fill(&self.format, &out_of(meltdown_pct, 5).to_string()),
            PhraseKind::OutOf10 => fill(&self.format, &out_of(meltdown_pct, 10).to_string()),
            PhraseKind::Fallback => fallback_sentence(meltdown_pct),
        }
    }
}

/// Buckets 0..=100 into 1..=`scale` (100 itself lands one past the top bucket).
fn out_of(meltdown_pct: i32, scale: i32) -> usize {
    (meltdown_pct.clamp(0, 100) / (100 / scale) + 1) as usize
}

fn fallback_sentence(meltdown_pct: i32) -> String {
    format!("This Tweet is a {meltdown_pct}% meltdown.")
}

fn editorial_clause(subject_tag: &str, average_score: f64, trending_toward_meltdown: bool) -> String {
    if average_score >= 0.0 {
        let mut clause = format!("#{subject_tag} is not currently melting down ");
        if trending_toward_meltdown {
            clause.push_str("but is trending toward a meltdown!");
        }
        clause
    } else {
        format!("#{} IS CURRENTLY MELTING DOWN", subject_tag.to_uppercase())
    }
}

/// Substitutes the first printf-style placeholder (`%d`, `%s`, `%v`) with `arg`; `%%` is a
/// literal percent sign.
fn fill(format: &str, arg: &str) -> String {
    let mut out = String::with_capacity(format.len() + arg.len());
    let mut filled = false;
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('%') => {
                chars.next();
                out.push('%');
            }
            Some('d' | 's' | 'v') if !filled => {
                chars.next();
                out.push_str(arg);
                filled = true;
            }
            _ => out.push('%'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn phrase(format: &str, kind: PhraseKind, ch: &str) -> Phrase {
        Phrase {
            format: format.to_string(),
            kind,
            char: ch.to_string(),
        }
    }

    #[test]
    fn parses_phrase_file() {
        let raw = br#"{"phrases": [
            {"format": "Meltdown level: %d%%", "type": "percentage"},
            {"format": "%s", "type": "repeat-char-out-of-10", "char": "X"},
            {"format": "%d/5", "type": "out-of-5", "char": ""},
            {"format": "%d/10", "type": "out-of-10", "char": ""},
            {"format": "??", "type": "something-new", "char": ""}
        ]}"#;
        let book = PhraseBook::from_json(raw).unwrap();
        let kinds: Vec<_> = book.phrases.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            [
                PhraseKind::Percentage,
                PhraseKind::RepeatCharOutOf10,
                PhraseKind::OutOf5,
                PhraseKind::OutOf10,
                PhraseKind::Fallback,
            ]
        );
    }

    #[test]
    fn repeat_char_counts() {
        let p = phrase("[%s]", PhraseKind::RepeatCharOutOf10, "🔥");
        assert_eq!(p.render(95), format!("[{}]", "🔥".repeat(10)));
        assert_eq!(p.render(0), "[🔥]");
        assert_eq!(p.render(9), "[🔥]");
        assert_eq!(p.render(10), "[🔥🔥]");
    }

    #[test]
    fn scaled_categories() {
        assert_eq!(phrase("%d/5", PhraseKind::OutOf5, "").render(0), "1/5");
        assert_eq!(phrase("%d/5", PhraseKind::OutOf5, "").render(99), "5/5");
        assert_eq!(phrase("%d/10", PhraseKind::OutOf10, "").render(42), "5/10");
        assert_eq!(phrase("%d%% melted", PhraseKind::Percentage, "").render(73), "73% melted");
        assert_eq!(
            phrase("ignored", PhraseKind::Fallback, "").render(12),
            "This Tweet is a 12% meltdown."
        );
    }

    #[test]
    fn empty_book_uses_fallback() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            PhraseBook::default().intro(40, &mut rng),
            "This Tweet is a 40% meltdown."
        );
    }

    #[test]
    fn seeded_rng_gives_reproducible_choice() {
        let book = PhraseBook {
            phrases: vec![
                phrase("a %d", PhraseKind::Percentage, ""),
                phrase("b %d", PhraseKind::Percentage, ""),
                phrase("c %d", PhraseKind::Percentage, ""),
            ],
        };
        let mut x = StdRng::seed_from_u64(99);
        let mut y = StdRng::seed_from_u64(99);
        for _ in 0..20 {
            assert_eq!(book.intro(10, &mut x), book.intro(10, &mut y));
        }
    }

    fn ctx(average_score: f64, trending: bool) -> ReplyContext<'static> {
        ReplyContext {
            handle: "realDonaldTrump",
            subject_tag: "Trump",
            site_url: "https://isTrumpMeltingDown.com",
            item_id: "123",
            meltdown_pct: 60,
            average_score,
            trending_toward_meltdown: trending,
        }
    }

    #[test]
    fn reply_for_calm_but_trending_subject() {
        let book = PhraseBook {
            phrases: vec![phrase("Meltdown: %d%%.", PhraseKind::Percentage, "")],
        };
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(
            book.compose_reply(&ctx(0.15, true), &mut rng),
            "@realDonaldTrump Meltdown: 60%.  #Trump is not currently melting down but is trending toward a meltdown!\n\
             Check it out here: https://isTrumpMeltingDown.com?id=123"
        );
    }

    #[test]
    fn reply_for_negative_average() {
        let mut rng = StdRng::seed_from_u64(3);
        let text = PhraseBook::default().compose_reply(&ctx(-0.3, true), &mut rng);
        assert!(text.contains("#TRUMP IS CURRENTLY MELTING DOWN"));
        assert!(!text.contains("trending"));
        assert!(text.ends_with("?id=123"));
    }

    #[test]
    fn fill_leaves_extra_placeholders_alone() {
        assert_eq!(fill("%d and %d", "1"), "1 and %d");
        assert_eq!(fill("100%", "x"), "100%");
    }
}
