//! Text fed to the embedding provider. Stories and papers share the same
//! labelled layout so their embeddings are comparable.

use ideagate_common::Story;

fn push_field(out: &mut Vec<String>, label: &str, value: &str) {
    let value = value.trim();
    if !value.is_empty() {
        out.push(format!("{label}: {value}"));
    }
}

pub fn build_story_text(story: &Story) -> String {
    let mut parts = Vec::new();
    push_field(&mut parts, "Title", &story.title);
    push_field(&mut parts, "Abstract", &story.abstract_text);
    push_field(&mut parts, "Problem", &story.problem_framing);
    push_field(&mut parts, "Gap", &story.gap_pattern);
    push_field(&mut parts, "Solution", &story.solution);
    push_field(&mut parts, "Method", &story.method_skeleton);
    let claims: Vec<&str> = story
        .innovation_claims
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect();
    push_field(&mut parts, "Claims", &claims.join("; "));
    push_field(&mut parts, "Experiments", &story.experiments_plan);
    parts.join("\n")
}

pub fn build_paper_text(title: &str, abstract_text: &str) -> String {
    let mut parts = Vec::new();
    push_field(&mut parts, "Title", title);
    push_field(&mut parts, "Abstract", abstract_text);
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_story_text_skips_empty_fields() {
        let story = Story {
            title: "Sparse probes".into(),
            solution: "  prune heads ".into(),
            innovation_claims: vec!["fast".into(), " ".into(), "cheap".into()],
            ..Default::default()
        };
        assert_eq!(build_story_text(&story), "Title: Sparse probes\nSolution: prune heads\nClaims: fast; cheap");
    }

    #[test]
    fn test_paper_text_matches_story_layout() {
        let story = Story { title: "T".into(), abstract_text: "A".into(), ..Default::default() };
        assert_eq!(build_paper_text("T", "A"), build_story_text(&story));
    }
}
