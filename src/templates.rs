//! Résumé templates – turn a [`Resume`] into a positioned [`ContentBlock`].
//!
//! Every section heading is recorded as a [`SectionMarker`] at the top edge
//! of the heading so the pagination engine can keep it off page bottoms.
//! Body text wraps with [`wrap_text`], measured by the same [`FontManager`]
//! the rasterizer draws with.
//!
//! [`SectionMarker`]: crate::content::SectionMarker

use crate::compositor::{Sidebar, SidebarPosition};
use crate::content::{ContentBlock, ContentItem, Rgba, TextRun};
use crate::fonts::{wrap_text, FontManager, FontVariant};
use crate::geometry::A4_WIDTH_PX;
use crate::resume::{Proficiency, Resume};

/// `#2c3e50`
const SLATE: Rgba = Rgba::opaque(44.0 / 255.0, 62.0 / 255.0, 80.0 / 255.0);
/// `#34495e`
const SLATE_LIGHT: Rgba = Rgba::opaque(52.0 / 255.0, 73.0 / 255.0, 94.0 / 255.0);
/// `#333333`
const INK: Rgba = Rgba::opaque(0.2, 0.2, 0.2);
/// `#7f8c8d`
const MUTED: Rgba = Rgba::opaque(127.0 / 255.0, 140.0 / 255.0, 141.0 / 255.0);
/// `#bdc3c7`
const SIDEBAR_MUTED: Rgba = Rgba::opaque(189.0 / 255.0, 195.0 / 255.0, 199.0 / 255.0);

const SIDEBAR_WIDTH: f32 = 280.0;
const LINE_FACTOR: f32 = 1.4;
const PAGE_MARGIN: f32 = 48.0;
const BOTTOM_MARGIN: f32 = 40.0;

/// A selectable résumé template.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    /// Band painted beneath every page of this template.
    pub sidebar: Sidebar,
}

const TEMPLATES: &[TemplateInfo] = &[
    TemplateInfo {
        id: "professional",
        name: "Professional",
        description: "Two columns with a dark sidebar for contact details and skills",
        sidebar: Sidebar::Band {
            width: SIDEBAR_WIDTH,
            color: SLATE,
            position: SidebarPosition::Left,
        },
    },
    TemplateInfo {
        id: "classic",
        name: "Classic",
        description: "Single column, traditional layout",
        sidebar: Sidebar::None,
    },
];

/// All registered templates, default first.
pub fn template_list() -> &'static [TemplateInfo] {
    TEMPLATES
}

/// Look up a template by id. Unknown ids fall back to the default template.
pub fn get_template(id: &str) -> &'static TemplateInfo {
    TEMPLATES
        .iter()
        .find(|t| t.id.eq_ignore_ascii_case(id))
        .unwrap_or(&TEMPLATES[0])
}

/// Render a résumé with the given template.
pub fn render_resume(resume: &Resume, template: &TemplateInfo, fonts: &FontManager) -> ContentBlock {
    let mut block = ContentBlock::new(A4_WIDTH_PX);
    let bottom = match template.id {
        "classic" => render_classic(resume, &mut block, fonts),
        _ => render_professional(resume, &mut block, fonts),
    };
    block.height = Some(bottom + BOTTOM_MARGIN);
    log::debug!(
        "rendered '{}' template: {} items, {} section markers, {:.0}px",
        template.id,
        block.items.len(),
        block.markers.len(),
        bottom + BOTTOM_MARGIN
    );
    block
}

#[derive(Debug, Clone, Copy)]
struct TextStyle {
    size: f32,
    bold: bool,
    italic: bool,
    color: Rgba,
}

impl TextStyle {
    const fn new(size: f32, color: Rgba) -> Self {
        Self {
            size,
            bold: false,
            italic: false,
            color,
        }
    }

    const fn bold(self) -> Self {
        Self { bold: true, ..self }
    }

    const fn italic(self) -> Self {
        Self {
            italic: true,
            ..self
        }
    }

    fn variant(&self) -> FontVariant {
        FontVariant::new(self.bold, self.italic)
    }
}

/// Column palette.
#[derive(Debug, Clone, Copy)]
struct Palette {
    text: Rgba,
    heading: Rgba,
    muted: Rgba,
}

const MAIN_PALETTE: Palette = Palette {
    text: INK,
    heading: SLATE,
    muted: MUTED,
};

const SIDEBAR_PALETTE: Palette = Palette {
    text: Rgba::WHITE,
    heading: Rgba::WHITE,
    muted: SIDEBAR_MUTED,
};

/// Writes flowing text down one column of the block.
struct Pen<'a> {
    block: &'a mut ContentBlock,
    fonts: &'a FontManager,
    x: f32,
    width: f32,
    y: f32,
    palette: Palette,
}

impl<'a> Pen<'a> {
    fn new(
        block: &'a mut ContentBlock,
        fonts: &'a FontManager,
        x: f32,
        width: f32,
        y: f32,
        palette: Palette,
    ) -> Self {
        Self {
            block,
            fonts,
            x,
            width,
            y,
            palette,
        }
    }

    fn gap(&mut self, px: f32) {
        self.y += px;
    }

    fn body(&self) -> TextStyle {
        TextStyle::new(11.0, self.palette.text)
    }

    fn muted(&self) -> TextStyle {
        TextStyle::new(10.0, self.palette.muted)
    }

    fn text(&mut self, text: &str, style: TextStyle) {
        self.text_at(self.x, self.width, text, style);
    }

    fn text_at(&mut self, x: f32, width: f32, text: &str, style: TextStyle) {
        if text.trim().is_empty() {
            return;
        }
        let line_height = self.fonts.line_height_px(style.size, LINE_FACTOR);
        for line in wrap_text(text, style.size, style.variant(), width, self.fonts) {
            if !line.is_empty() {
                self.block.push(ContentItem::Text(TextRun {
                    x,
                    y: self.y,
                    text: line,
                    font_size: style.size,
                    bold: style.bold,
                    italic: style.italic,
                    color: style.color,
                }));
            }
            self.y += line_height;
        }
    }

    fn rule(&mut self, height: f32, color: Rgba) {
        self.block.push(ContentItem::Rect {
            x: self.x,
            y: self.y,
            width: self.width,
            height,
            color,
        });
        self.y += height;
    }

    /// Section heading; its top edge becomes a section marker.
    fn heading(&mut self, title: &str) {
        self.gap(14.0);
        self.block.mark_section(self.y);
        let style = TextStyle::new(14.0, self.palette.heading).bold();
        self.text(&title.to_uppercase(), style);
        self.gap(2.0);
        self.rule(1.5, self.palette.heading.with_alpha(0.6));
        self.gap(8.0);
    }

    fn bullets(&mut self, items: &[String]) {
        let style = self.body();
        let indent = 12.0;
        for item in items.iter().filter(|i| !i.trim().is_empty()) {
            let y = self.y;
            self.block.push(ContentItem::Text(TextRun {
                x: self.x,
                y,
                text: "•".to_string(),
                font_size: style.size,
                bold: false,
                italic: false,
                color: style.color,
            }));
            self.text_at(self.x + indent, self.width - indent, item, style);
            self.gap(2.0);
        }
    }

    /// Title line, optional subtitle line, optional dates line.
    fn entry(&mut self, title: &str, subtitle: &str, dates: &str) {
        self.text(title, self.body().bold());
        self.text(subtitle, self.body().italic());
        self.text(dates, self.muted());
        self.gap(2.0);
    }
}

fn date_range(start: &str, end: &str, current: bool) -> String {
    let end = if current { "Present" } else { end };
    match (start.is_empty(), end.is_empty()) {
        (true, true) => String::new(),
        (false, true) => start.to_string(),
        (true, false) => end.to_string(),
        (false, false) => format!("{start} - {end}"),
    }
}

fn proficiency_label(p: Proficiency) -> &'static str {
    match p {
        Proficiency::Basic => "Basic",
        Proficiency::Intermediate => "Intermediate",
        Proficiency::Fluent => "Fluent",
        Proficiency::Native => "Native",
    }
}

fn render_professional(resume: &Resume, block: &mut ContentBlock, fonts: &FontManager) -> f32 {
    let inner_x = 24.0;
    let inner_w = SIDEBAR_WIDTH - 2.0 * inner_x;
    let name_style = TextStyle::new(24.0, Rgba::WHITE).bold();
    let title_style = TextStyle::new(13.0, SIDEBAR_MUTED);

    let mut header_top = 32.0;
    if let Some(photo) = resume.header.photo_url.as_deref().filter(|p| !p.is_empty()) {
        let size = 120.0;
        block.push(ContentItem::Image {
            x: (SIDEBAR_WIDTH - size) / 2.0,
            y: header_top,
            width: size,
            height: size,
            src: photo.to_string(),
        });
        header_top += size + 20.0;
    }

    // The header band goes beneath the name, so size it before painting text.
    let line_count = |text: &str, style: TextStyle| {
        if text.trim().is_empty() {
            0
        } else {
            wrap_text(text, style.size, style.variant(), inner_w, fonts).len()
        }
    };
    let header_height = 16.0
        + line_count(&resume.header.full_name, name_style) as f32
            * fonts.line_height_px(name_style.size, LINE_FACTOR)
        + line_count(&resume.header.job_title, title_style) as f32
            * fonts.line_height_px(title_style.size, LINE_FACTOR)
        + 16.0;
    block.push(ContentItem::Rect {
        x: 0.0,
        y: header_top,
        width: SIDEBAR_WIDTH,
        height: header_height,
        color: SLATE_LIGHT,
    });

    let sidebar_bottom = {
        let mut pen = Pen::new(block, fonts, inner_x, inner_w, header_top + 16.0, SIDEBAR_PALETTE);
        pen.text(&resume.header.full_name, name_style);
        pen.text(&resume.header.job_title, title_style);
        pen.y = header_top + header_height + 8.0;

        let contact = &resume.contact;
        let lines: Vec<&str> = [
            contact.phone.as_str(),
            contact.email.as_str(),
            contact.address.as_str(),
            contact.website.as_deref().unwrap_or(""),
        ]
        .into_iter()
        .filter(|l| !l.trim().is_empty())
        .collect();
        if !lines.is_empty() {
            pen.heading("Contact");
            for line in lines {
                pen.text(line, pen.body());
                pen.gap(4.0);
            }
        }

        if !resume.skills.is_empty() {
            pen.heading("Skills");
            pen.bullets(&resume.skills);
        }

        if !resume.languages.is_empty() {
            pen.heading("Languages");
            for lang in &resume.languages {
                pen.text(&lang.name, pen.body().bold());
                pen.text(proficiency_label(lang.proficiency), pen.muted());
                pen.gap(4.0);
            }
        }

        if let Some(r) = &resume.reference {
            pen.heading("Reference");
            pen.text(&r.name, pen.body().bold());
            let role = [r.role.as_str(), r.company.as_str()]
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(", ");
            pen.text(&role, pen.muted());
            pen.text(&r.phone, pen.body());
            pen.text(&r.email, pen.body());
        }
        pen.y
    };

    let main_x = SIDEBAR_WIDTH + 32.0;
    let main_w = A4_WIDTH_PX - main_x - 32.0;
    let mut pen = Pen::new(block, fonts, main_x, main_w, 18.0, MAIN_PALETTE);
    main_sections(resume, &mut pen);
    sidebar_bottom.max(pen.y)
}

fn render_classic(resume: &Resume, block: &mut ContentBlock, fonts: &FontManager) -> f32 {
    let width = A4_WIDTH_PX - 2.0 * PAGE_MARGIN;
    let mut pen = Pen::new(block, fonts, PAGE_MARGIN, width, PAGE_MARGIN, MAIN_PALETTE);

    if let Some(photo) = resume.header.photo_url.as_deref().filter(|p| !p.is_empty()) {
        let size = 96.0;
        pen.block.push(ContentItem::Image {
            x: PAGE_MARGIN + width - size,
            y: pen.y,
            width: size,
            height: size,
            src: photo.to_string(),
        });
    }

    pen.text(&resume.header.full_name, TextStyle::new(28.0, SLATE).bold());
    pen.text(&resume.header.job_title, TextStyle::new(14.0, MUTED));
    let contact = &resume.contact;
    let line = [
        contact.phone.as_str(),
        contact.email.as_str(),
        contact.address.as_str(),
        contact.website.as_deref().unwrap_or(""),
    ]
    .into_iter()
    .filter(|l| !l.trim().is_empty())
    .collect::<Vec<_>>()
    .join("  |  ");
    pen.text(&line, pen.muted());
    pen.gap(6.0);
    pen.rule(2.0, SLATE);

    main_sections(resume, &mut pen);

    if !resume.skills.is_empty() {
        pen.heading("Skills");
        pen.text(&resume.skills.join(", "), pen.body());
    }

    if !resume.languages.is_empty() {
        pen.heading("Languages");
        let langs = resume
            .languages
            .iter()
            .map(|l| format!("{} ({})", l.name, proficiency_label(l.proficiency)))
            .collect::<Vec<_>>()
            .join(", ");
        pen.text(&langs, pen.body());
    }

    if let Some(r) = &resume.reference {
        pen.heading("Reference");
        pen.entry(&r.name, &format!("{}, {}", r.role, r.company), "");
        pen.text(&format!("{}  |  {}", r.phone, r.email), pen.muted());
    }
    pen.y
}

/// Profile, experience, education and the optional sections, in order.
fn main_sections(resume: &Resume, pen: &mut Pen<'_>) {
    if !resume.profile.trim().is_empty() {
        pen.heading("Profile");
        pen.text(&resume.profile, pen.body());
    }

    if !resume.experience.is_empty() {
        pen.heading("Experience");
        for exp in &resume.experience {
            pen.entry(
                &exp.position,
                &exp.company,
                &date_range(&exp.start_date, &exp.end_date, exp.current),
            );
            pen.bullets(&exp.description);
            pen.gap(6.0);
        }
    }

    if !resume.education.is_empty() {
        pen.heading("Education");
        for edu in &resume.education {
            let dates = date_range(&edu.start_year, &edu.end_year, false);
            let dates = match &edu.gpa {
                Some(gpa) if !gpa.is_empty() => format!("{dates}  GPA {gpa}"),
                _ => dates,
            };
            pen.entry(&edu.degree, &edu.institution, &dates);
            pen.gap(4.0);
        }
    }

    if let Some(projects) = resume.projects.as_deref().filter(|p| !p.is_empty()) {
        pen.heading("Projects");
        for p in projects {
            let dates = date_range(
                p.start_date.as_deref().unwrap_or(""),
                p.end_date.as_deref().unwrap_or(""),
                false,
            );
            pen.entry(&p.name, p.link.as_deref().unwrap_or(""), &dates);
            pen.text(&p.description, pen.body());
            if !p.technologies.is_empty() {
                pen.text(&p.technologies.join(", "), pen.muted());
            }
            pen.gap(6.0);
        }
    }

    if let Some(certs) = resume.certifications.as_deref().filter(|c| !c.is_empty()) {
        pen.heading("Certifications");
        for c in certs {
            let dates = match &c.expiry_date {
                Some(exp) if !exp.is_empty() => format!("{} - {exp}", c.date),
                _ => c.date.clone(),
            };
            pen.entry(&c.name, &c.issuer, &dates);
            if let Some(id) = c.credential_id.as_deref().filter(|id| !id.is_empty()) {
                pen.text(&format!("Credential {id}"), pen.muted());
            }
            pen.gap(4.0);
        }
    }

    if let Some(awards) = resume.awards.as_deref().filter(|a| !a.is_empty()) {
        pen.heading("Awards");
        for a in awards {
            pen.entry(&a.title, &a.issuer, &a.date);
            pen.text(a.description.as_deref().unwrap_or(""), pen.body());
            pen.gap(4.0);
        }
    }

    if let Some(volunteer) = resume.volunteer.as_deref().filter(|v| !v.is_empty()) {
        pen.heading("Volunteer");
        for v in volunteer {
            pen.entry(
                &v.role,
                &v.organization,
                &date_range(&v.start_date, &v.end_date, v.current),
            );
            pen.bullets(&v.description);
            pen.gap(6.0);
        }
    }

    if let Some(pubs) = resume.publications.as_deref().filter(|p| !p.is_empty()) {
        pen.heading("Publications");
        for p in pubs {
            pen.entry(&p.title, &p.publisher, &p.date);
            pen.text(p.description.as_deref().unwrap_or(""), pen.body());
            pen.text(p.link.as_deref().unwrap_or(""), pen.muted());
            pen.gap(4.0);
        }
    }

    if let Some(interests) = resume.interests.as_deref().filter(|i| !i.is_empty()) {
        pen.heading("Interests");
        pen.text(&interests.join(", "), pen.body());
    }

    if let Some(links) = resume.portfolio.as_deref().filter(|l| !l.is_empty()) {
        pen.heading("Portfolio");
        for link in links {
            pen.text(&format!("{}: {}", link.label, link.url), pen.body());
        }
    }

    for section in resume.custom_sections.iter().flatten() {
        if section.items.is_empty() {
            continue;
        }
        pen.heading(&section.title);
        pen.bullets(&section.items);
    }
}
