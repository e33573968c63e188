//! Built-in datasets served when the CMS cannot be reached.

use chrono::Utc;
use indexmap::IndexMap;
use nexjob_core::{Article, FilterData, FilterState, Job, JobsPage, KeywordMode};

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

pub fn filter_data() -> FilterData {
    let provinces: IndexMap<String, Vec<String>> = [
        (
            "DKI Jakarta",
            &[
                "Jakarta Pusat",
                "Jakarta Selatan",
                "Jakarta Barat",
                "Jakarta Utara",
                "Jakarta Timur",
            ][..],
        ),
        ("Jawa Barat", &["Bandung", "Bekasi", "Bogor", "Depok", "Tangerang"][..]),
        ("Jawa Timur", &["Surabaya", "Malang", "Kediri", "Sidoarjo"][..]),
        ("Jawa Tengah", &["Semarang", "Solo", "Yogyakarta"][..]),
        ("Bali", &["Denpasar", "Ubud", "Sanur"][..]),
        ("Sumatera Utara", &["Medan", "Binjai"][..]),
    ]
    .into_iter()
    .map(|(province, cities)| (province.to_string(), strings(cities)))
    .collect();

    FilterData {
        provinces,
        categories: strings(&[
            "Teknologi Informasi",
            "Digital Marketing",
            "Customer Service",
            "Human Resources",
            "Sales",
            "Akuntansi",
            "Healthcare",
            "Pendidikan",
            "Logistik",
        ]),
        job_types: strings(&["Full Time", "Part Time", "Contract", "Freelance", "Internship"]),
        experiences: strings(&["Fresh Graduate", "1-2 Tahun", "2-3 Tahun", "3-5 Tahun", "5+ Tahun"]),
        educations: strings(&["SMA/SMK", "D3", "S1", "S2"]),
        work_policies: strings(&["On-site Working", "Remote Working", "Hybrid Working"]),
        industries: strings(&[
            "Teknologi Informasi",
            "Perbankan",
            "Healthcare",
            "Pendidikan",
            "E-commerce",
            "Otomotif",
            "Digital Marketing",
            "Human Resources",
            "Customer Service",
            "Sales",
            "Logistik",
            "Akuntansi",
        ]),
    }
}

pub fn sample_job() -> Job {
    Job {
        id: "1".into(),
        slug: "frontend-developer-react-js".into(),
        title: "Frontend Developer React.js".into(),
        content: "<p>Kami mencari Frontend Developer yang berpengalaman dengan React.js</p>".into(),
        company_name: "PT. Teknologi Digital Indonesia".into(),
        category: "Software Engineer".into(),
        province: "DKI Jakarta".into(),
        city: "Jakarta Selatan".into(),
        job_type: "Full Time".into(),
        education: "S1".into(),
        industry: "Teknologi Informasi".into(),
        experience: "2-4 Tahun".into(),
        tag: "React.js, Frontend Developer, JavaScript, TypeScript".into(),
        gender: "Laki-Laki atau Perempuan".into(),
        salary: "Rp 8-12 Juta".into(),
        work_policy: "Hybrid Working".into(),
        link: "#".into(),
        source: "Nexjob".into(),
        created_at: Some(Utc::now()),
        seo_title: Some("Frontend Developer React.js".into()),
        seo_description: Some("Lowongan Frontend Developer React.js di Jakarta".into()),
    }
}

pub fn sample_article() -> Article {
    let excerpt = "Panduan lengkap untuk mempersiapkan diri menghadapi interview kerja dan meningkatkan peluang diterima.";
    Article {
        id: "1".into(),
        slug: "tips-interview-kerja".into(),
        title: "Tips Sukses Interview Kerja".into(),
        excerpt: excerpt.into(),
        content: "<p>Artikel lengkap tentang tips interview kerja...</p>".into(),
        published_at: Some(Utc::now()),
        modified_at: None,
        featured_media_url: Some(
            "https://images.pexels.com/photos/5668858/pexels-photo-5668858.jpeg".into(),
        ),
        author_name: Some("Admin Nexjob".into()),
        categories: vec!["Tips Karir".into()],
        tags: vec!["Interview".into(), "Karir".into()],
        seo_title: "Tips Sukses Interview Kerja".into(),
        seo_description: excerpt.into(),
    }
}

/// The sample job narrowed by the same filters a live listing would use.
pub fn jobs_page(filters: &FilterState) -> JobsPage {
    let jobs = crate::narrow_page(vec![sample_job()], filters, KeywordMode::Local);
    JobsPage {
        total_jobs: jobs.len() as u64,
        jobs,
        total_pages: 1,
        current_page: 1,
        has_more: false,
        raw_count: 1,
        fallback: true,
    }
}
