//! Page metadata and schema.org JSON-LD documents.

use nexjob_adapters::text::{preferred_description, strip_tags, truncate_chars};
use nexjob_core::{valid_through, AdminSettings, Article, Job};
use serde_json::{json, Value};

const JOB_DESCRIPTION_CHARS: usize = 300;
const LISTED_JOB_DESCRIPTION_CHARS: usize = 200;
const ARTICLE_DESCRIPTION_CHARS: usize = 160;
const ITEM_LIST_LIMIT: usize = 10;

/// Head tags shared by every full page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageMeta {
    pub title: String,
    pub description: String,
    pub canonical: String,
    pub og_type: &'static str,
}

impl PageMeta {
    pub fn website(title: impl Into<String>, description: impl Into<String>, canonical: String) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            canonical,
            og_type: "website",
        }
    }

    pub fn article(title: impl Into<String>, description: impl Into<String>, canonical: String) -> Self {
        Self {
            og_type: "article",
            ..Self::website(title, description, canonical)
        }
    }
}

/// One crumb after "Home"; the last crumb usually has no link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crumb {
    pub label: String,
    pub href: Option<String>,
}

impl Crumb {
    pub fn link(label: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            href: Some(href.into()),
        }
    }

    pub fn here(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            href: None,
        }
    }
}

/// "Lowongan Kerja {category} di {location} - Nexjob", either part optional.
pub fn listing_title(category: Option<&str>, location: Option<&str>) -> String {
    let mut title = "Lowongan Kerja".to_string();
    if let Some(category) = category {
        title.push(' ');
        title.push_str(category);
    }
    if let Some(location) = location {
        title.push_str(" di ");
        title.push_str(location);
    }
    title.push_str(" - Nexjob");
    title
}

pub fn listing_description(category: Option<&str>, location: Option<&str>) -> String {
    let mut description = "Temukan lowongan kerja".to_string();
    if let Some(category) = category {
        description.push(' ');
        description.push_str(category);
    }
    if let Some(location) = location {
        description.push_str(" di ");
        description.push_str(location);
    }
    description.push_str(". Dapatkan pekerjaan impian Anda dengan gaji terbaik di Nexjob.");
    description
}

pub fn job_title(job: &Job) -> String {
    match job.seo_title.as_deref().filter(|t| !t.trim().is_empty()) {
        Some(title) => title.to_string(),
        None => format!("{} di {} - Nexjob", job.title, job.company_name),
    }
}

pub fn job_description(job: &Job, max: usize) -> String {
    let text = preferred_description(&job.content, job.seo_description.as_deref().unwrap_or_default());
    truncate_chars(&text, max)
}

pub fn article_description(article: &Article) -> String {
    truncate_chars(
        &preferred_description(&article.excerpt, &article.seo_description),
        ARTICLE_DESCRIPTION_CHARS,
    )
}

/// schema.org employment type for a CMS job-type label.
pub fn employment_type(job_type: &str) -> &'static str {
    match job_type.trim() {
        "Part Time" => "PART_TIME",
        "Contract" | "Kontrak" => "CONTRACTOR",
        "Freelance" => "TEMPORARY",
        "Internship" | "Magang" | "Intern" => "INTERN",
        _ => "FULL_TIME",
    }
}

/// Monthly IDR salary, or null when the posting says it is negotiable.
pub fn salary(raw: &str) -> Value {
    let raw = raw.trim();
    if raw.is_empty() || raw.to_lowercase().contains("negosiasi") {
        return Value::Null;
    }
    json!({
        "@type": "MonetaryAmount",
        "currency": "IDR",
        "value": {
            "@type": "QuantitativeValue",
            "name": raw,
            "unitText": "MONTH"
        }
    })
}

fn job_location(job: &Job) -> Value {
    json!({
        "@type": "Place",
        "address": {
            "@type": "PostalAddress",
            "addressLocality": job.city,
            "addressRegion": job.province,
            "addressCountry": "ID"
        }
    })
}

pub fn website(base: &str, settings: &AdminSettings) -> Value {
    json!({
        "@context": "https://schema.org",
        "@type": "WebSite",
        "name": settings.site_title,
        "description": settings.site_description,
        "url": base,
        "potentialAction": {
            "@type": "SearchAction",
            "target": {
                "@type": "EntryPoint",
                "urlTemplate": format!("{base}/lowongan-kerja/?search={{search_term_string}}")
            },
            "query-input": "required name=search_term_string"
        },
        "publisher": {
            "@type": "Organization",
            "name": "Nexjob",
            "url": base,
            "logo": { "@type": "ImageObject", "url": format!("{base}/logo.png") }
        }
    })
}

pub fn organization(base: &str) -> Value {
    json!({
        "@context": "https://schema.org",
        "@type": "Organization",
        "name": "Nexjob",
        "url": base,
        "logo": format!("{base}/logo.png"),
        "description": "Platform pencarian kerja terpercaya di Indonesia dengan ribuan lowongan dari perusahaan terbaik",
        "contactPoint": {
            "@type": "ContactPoint",
            "contactType": "customer service",
            "availableLanguage": "Indonesian"
        }
    })
}

pub fn job_posting(base: &str, job: &Job) -> Value {
    let posted = job.created_at.unwrap_or_else(chrono::Utc::now);
    json!({
        "@context": "https://schema.org",
        "@type": "JobPosting",
        "title": job.title,
        "description": job_description(job, JOB_DESCRIPTION_CHARS),
        "datePosted": posted.to_rfc3339(),
        "validThrough": valid_through(posted).to_rfc3339(),
        "employmentType": employment_type(&job.job_type),
        "identifier": {
            "@type": "PropertyValue",
            "name": job.company_name,
            "value": job.id
        },
        "hiringOrganization": {
            "@type": "Organization",
            "name": job.company_name,
            "sameAs": base
        },
        "jobLocation": job_location(job),
        "baseSalary": salary(&job.salary),
        "qualifications": job.education,
        "experienceRequirements": job.experience,
        "industry": job.industry,
        "workHours": job.work_policy,
        "url": format!("{base}{}", job.detail_path()),
        "applicationContact": { "@type": "ContactPoint", "url": job.link }
    })
}

pub fn breadcrumbs(base: &str, crumbs: &[Crumb]) -> Value {
    let mut items = vec![json!({
        "@type": "ListItem",
        "position": 1,
        "name": "Home",
        "item": format!("{base}/")
    })];
    for (index, crumb) in crumbs.iter().enumerate() {
        let mut item = json!({
            "@type": "ListItem",
            "position": index + 2,
            "name": crumb.label,
        });
        if let Some(href) = &crumb.href {
            item["item"] = Value::String(format!("{base}{href}"));
        }
        items.push(item);
    }
    json!({
        "@context": "https://schema.org",
        "@type": "BreadcrumbList",
        "itemListElement": items
    })
}

fn author_name(article: &Article) -> &str {
    article.author_name.as_deref().unwrap_or("Nexjob Team")
}

pub fn blog_posting(base: &str, article: &Article) -> Value {
    let published = article.published_at.map(|d| d.to_rfc3339());
    let modified = article.modified_at.map(|d| d.to_rfc3339()).or_else(|| published.clone());
    json!({
        "@context": "https://schema.org",
        "@type": "BlogPosting",
        "headline": article.title,
        "description": article_description(article),
        "image": article
            .featured_media_url
            .clone()
            .unwrap_or_else(|| format!("{base}/default-article-image.jpg")),
        "author": { "@type": "Person", "name": author_name(article) },
        "publisher": {
            "@type": "Organization",
            "name": "Nexjob",
            "logo": { "@type": "ImageObject", "url": format!("{base}/logo.png") }
        },
        "datePublished": published,
        "dateModified": modified,
        "mainEntityOfPage": { "@type": "WebPage", "@id": format!("{base}{}", article.detail_path()) },
        "articleSection": article.categories.first().map(String::as_str).unwrap_or("Career Tips"),
        "keywords": article.tags.join(", "),
        "url": format!("{base}{}", article.detail_path())
    })
}

pub fn job_list(base: &str, jobs: &[Job]) -> Value {
    let items = jobs
        .iter()
        .take(ITEM_LIST_LIMIT)
        .enumerate()
        .map(|(index, job)| {
            json!({
                "@type": "ListItem",
                "position": index + 1,
                "item": {
                    "@type": "JobPosting",
                    "title": job.title,
                    "description": job_description(job, LISTED_JOB_DESCRIPTION_CHARS),
                    "datePosted": job.created_at.map(|d| d.to_rfc3339()),
                    "employmentType": employment_type(&job.job_type),
                    "hiringOrganization": { "@type": "Organization", "name": job.company_name },
                    "jobLocation": job_location(job),
                    "baseSalary": salary(&job.salary),
                    "url": format!("{base}{}", job.detail_path())
                }
            })
        })
        .collect::<Vec<_>>();
    json!({
        "@context": "https://schema.org",
        "@type": "ItemList",
        "name": "Job Listings",
        "description": "Latest job opportunities available on Nexjob",
        "url": format!("{base}/lowongan-kerja/"),
        "numberOfItems": jobs.len(),
        "itemListElement": items
    })
}

pub fn article_list(base: &str, articles: &[Article]) -> Value {
    let items = articles
        .iter()
        .take(ITEM_LIST_LIMIT)
        .enumerate()
        .map(|(index, article)| {
            json!({
                "@type": "ListItem",
                "position": index + 1,
                "item": {
                    "@type": "BlogPosting",
                    "headline": article.title,
                    "description": article_description(article),
                    "author": { "@type": "Person", "name": author_name(article) },
                    "datePublished": article.published_at.map(|d| d.to_rfc3339()),
                    "url": format!("{base}{}", article.detail_path())
                }
            })
        })
        .collect::<Vec<_>>();
    json!({
        "@context": "https://schema.org",
        "@type": "ItemList",
        "name": "Career Articles",
        "description": "Latest career tips and guidance articles",
        "url": format!("{base}/artikel/"),
        "numberOfItems": articles.len(),
        "itemListElement": items
    })
}

/// Serializes documents for embedding inside `<script type="application/ld+json">`.
pub fn script_body(documents: &[Value]) -> String {
    let body = match documents {
        [single] => single.to_string(),
        many => Value::Array(many.to_vec()).to_string(),
    };
    body.replace("</", "<\\/")
}

/// Plain-text teaser for job cards.
pub fn card_excerpt(job: &Job) -> String {
    truncate_chars(&strip_tags(&job.content), 140)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use nexjob_adapters::fallback::{sample_article, sample_job};

    #[test]
    fn listing_titles_follow_route_facets() {
        assert_eq!(listing_title(None, None), "Lowongan Kerja - Nexjob");
        assert_eq!(
            listing_title(Some("Teknologi Informasi"), Some("Bandung")),
            "Lowongan Kerja Teknologi Informasi di Bandung - Nexjob"
        );
        assert_eq!(
            listing_description(None, Some("Bali")),
            "Temukan lowongan kerja di Bali. Dapatkan pekerjaan impian Anda dengan gaji terbaik di Nexjob."
        );
    }

    #[test]
    fn employment_types_map_with_full_time_default() {
        assert_eq!(employment_type("Kontrak"), "CONTRACTOR");
        assert_eq!(employment_type("Magang"), "INTERN");
        assert_eq!(employment_type("Freelance"), "TEMPORARY");
        assert_eq!(employment_type("Part Time"), "PART_TIME");
        assert_eq!(employment_type("Shift"), "FULL_TIME");
    }

    #[test]
    fn negotiable_salary_is_null() {
        assert_eq!(salary("Negosiasi"), Value::Null);
        assert_eq!(salary(""), Value::Null);
        let amount = salary("Rp 5.000.000 - Rp 7.000.000");
        assert_eq!(amount["currency"], "IDR");
        assert_eq!(amount["value"]["unitText"], "MONTH");
    }

    #[test]
    fn job_posting_is_valid_for_thirty_days() {
        let job = Job {
            created_at: Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()),
            job_type: "Kontrak".into(),
            ..sample_job()
        };
        let doc = job_posting("https://nexjob.tech", &job);
        assert_eq!(doc["validThrough"], "2024-03-31T08:00:00+00:00");
        assert_eq!(doc["employmentType"], "CONTRACTOR");
        assert_eq!(doc["url"], format!("https://nexjob.tech/lowongan-kerja/{}/", job.slug));
    }

    #[test]
    fn breadcrumbs_start_at_home() {
        let doc = breadcrumbs(
            "https://nexjob.tech",
            &[Crumb::link("Lowongan Kerja", "/lowongan-kerja/"), Crumb::here("Kasir")],
        );
        let items = doc["itemListElement"].as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0]["name"], "Home");
        assert_eq!(items[1]["item"], "https://nexjob.tech/lowongan-kerja/");
        assert_eq!(items[2]["position"], 3);
        assert!(items[2].get("item").is_none());
    }

    #[test]
    fn item_lists_cap_at_ten_entries() {
        let jobs = (0..12)
            .map(|i| Job {
                id: i.to_string(),
                slug: format!("job-{i}"),
                ..sample_job()
            })
            .collect::<Vec<_>>();
        let doc = job_list("https://nexjob.tech", &jobs);
        assert_eq!(doc["numberOfItems"], 12);
        assert_eq!(doc["itemListElement"].as_array().unwrap().len(), 10);

        let articles = article_list("https://nexjob.tech", &[sample_article()]);
        assert_eq!(articles["itemListElement"][0]["position"], 1);
    }

    #[test]
    fn script_body_cannot_close_the_script_tag() {
        let doc = json!({ "name": "</script><b>" });
        assert!(!script_body(&[doc]).contains("</script>"));
    }
}
