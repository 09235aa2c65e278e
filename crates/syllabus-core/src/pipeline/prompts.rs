//! Prompt text for the three standard stages.
//!
//! Each renderer is pure: the request plus everything produced so far in,
//! one prompt string out.

use super::{GenerationContext, GenerationRequest};

/// Append every prior stage output under its own heading.
fn push_prior(out: &mut String, context: &GenerationContext) {
    for (stage, text) in context.iter() {
        out.push_str(&format!("\n## Output of the {stage} stage\n\n"));
        out.push_str(text.trim());
        out.push('\n');
    }
}

fn push_header(out: &mut String, request: &GenerationRequest) {
    out.push_str(&format!(
        "Learning goal: {}\nDuration: {} weeks\n",
        request.goal(),
        request.weeks()
    ));
}

pub fn strategist(request: &GenerationRequest, context: &GenerationContext) -> String {
    let mut out = String::from(
        "You are a curriculum strategist. Break the learning goal below into \
         learning objectives and a week-by-week progression.\n\n",
    );
    push_header(&mut out, request);
    out.push_str(&format!(
        "\nCover the main topics, the prerequisites a learner needs first, the key \
         objectives of each phase, and how the material should be spread across \
         {} weeks, moving from fundamentals to advanced work. Answer in prose.\n",
        request.weeks()
    ));
    push_prior(&mut out, context);
    out
}

pub fn scout(request: &GenerationRequest, context: &GenerationContext) -> String {
    let mut out = String::from(
        "You are a research scout. Using the strategist's breakdown, collect \
         well-known, credible learning resources for each week.\n\n",
    );
    push_header(&mut out, request);
    out.push_str(
        "\nConsider courses, videos, official documentation, articles and practice \
         projects. For every resource give its title, URL, type (video, article, \
         course, documentation, ...) and the objective it supports.\n",
    );
    push_prior(&mut out, context);
    out
}

pub fn architect(request: &GenerationRequest, context: &GenerationContext) -> String {
    let weeks = request.weeks();
    let goal_json = serde_json::to_string(request.goal()).unwrap_or_default();

    let mut out = String::from(
        "You are a study plan architect. Combine the strategist's objectives and the \
         scout's resources into one structured study plan.\n\n",
    );
    push_header(&mut out, request);
    out.push_str(&format!(
        r#"
Reply with a single JSON object of exactly this shape:

{{
  "goal": {goal_json},
  "weeks": {weeks},
  "milestones": [
    {{
      "week": 1,
      "title": "Week title",
      "objectives": ["objective"],
      "resources": [{{"title": "Name", "url": "https://example.com", "type": "video"}}],
      "daily_tasks": ["Day 1 task", "Day 2 task"]
    }}
  ]
}}

Rules:
- exactly {weeks} milestones, weeks numbered 1 to {weeks} in order
- every milestone has a descriptive title
- 2-4 objectives, 2-5 resources with real URLs and 5-7 daily tasks per week
- output only the JSON, optionally inside a ```json fence
"#
    ));
    push_prior(&mut out, context);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest::new("Learn Rust", 4).unwrap()
    }

    #[test]
    fn strategist_sees_goal_and_weeks() {
        let prompt = strategist(&request(), &GenerationContext::default());
        assert!(prompt.contains("Learning goal: Learn Rust"));
        assert!(prompt.contains("Duration: 4 weeks"));
        assert!(!prompt.contains("## Output of"));
    }

    #[test]
    fn scout_includes_strategist_output() {
        let mut ctx = GenerationContext::default();
        ctx.push("strategist", "Week 1: ownership\n".to_string());
        let prompt = scout(&request(), &ctx);
        assert!(prompt.contains("## Output of the strategist stage"));
        assert!(prompt.contains("Week 1: ownership"));
    }

    #[test]
    fn architect_includes_all_prior_outputs_in_order() {
        let mut ctx = GenerationContext::default();
        ctx.push("strategist", "objectives".to_string());
        ctx.push("scout", "resources".to_string());
        let prompt = architect(&request(), &ctx);
        let s = prompt.find("objectives\n").unwrap();
        let r = prompt.find("resources\n").unwrap();
        assert!(s < r);
        assert!(prompt.contains("\"weeks\": 4"));
        assert!(prompt.contains("\"goal\": \"Learn Rust\""));
    }

    #[test]
    fn architect_escapes_goal_as_json() {
        let req = GenerationRequest::new(r#"Read "SICP""#, 1).unwrap();
        let prompt = architect(&req, &GenerationContext::default());
        assert!(prompt.contains(r#""goal": "Read \"SICP\"""#));
    }
}
