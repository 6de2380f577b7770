// Team assembly prompt templates.

pub fn rewrite_prompt(project_requirements: &str) -> String {
    format!(
        "Rewrite the following query to better match the content of a resume database. \
Focus on extracting key skills, roles, and experiences that would be relevant for \
team assembly. Return only a single query.

Query: {project_requirements}
Answer:"
    )
}

pub const REWRITE_SYSTEM: &str = "\
You turn project descriptions into search queries phrased the way resumes are written: \
skills, roles, technologies and years of experience.";

/// Marks the boundary between candidate rewrites when a model returns several.
pub const REWRITE_CANDIDATE_DELIMITER: &str = "**";

pub const TEAM_ASSEMBLY_SYSTEM: &str = r#"You are a team assembly assistant. Your task is to:
1. Analyze the project requirements provided
2. Select the best matching candidates from the resume excerpts provided
3. Recommend a team composition with clear justification for each selection
4. Consider skills, experience and team dynamics

Format your response exactly as follows:

Project Requirements Analysis:
[Brief analysis of the key requirements and challenges]

Recommended Team:

1. [Full Name] - [Primary Role]
   Key Qualifications:
   - [Skill Name] (X years experience)
   - [Skill Name] (X years)
   - [Certification/Qualification]

   Justification:
   [Why this person is a good fit for the role]

2. [Full Name] - [Primary Role]
   Key Qualifications:
   - [Relevant skills]
   - [Relevant experience]
   - [Relevant certifications]

   Justification:
   [Why this person is a good fit for the role]

[Continue for each team member...]

Roles and skill categories are at most two words each.

Team Dynamics:
[How the team members complement each other and why they would work well together]"#;

/// Both values are inserted verbatim; neither is scanned for placeholders.
pub fn team_assembly_prompt(project_requirements: &str, candidates: &str) -> String {
    format!(
        "Project Requirements:
{project_requirements}

Available Candidates:
{candidates}"
    )
}
