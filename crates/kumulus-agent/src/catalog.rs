//! Container layout of each deployable application.

use kumulus_proto::{AppType, Size};

/// CPU and memory shares for one container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resources {
    /// CPU cores.
    pub cpu: u32,
    /// Memory limit.
    pub memory: Size,
}

impl Resources {
    const fn new(cpu: u32, memory_mb: u64) -> Self {
        Self {
            cpu,
            memory: Size::from_megabytes(memory_mb),
        }
    }
}

/// Database container backing an application.
#[derive(Debug, Clone, Copy)]
pub struct DatabaseSpec {
    /// Image reference.
    pub image: &'static str,
    /// Port the database listens on inside the network.
    pub internal_port: u16,
    /// Environment for the database container.
    pub env: &'static [(&'static str, &'static str)],
    /// Resource shares.
    pub resources: Resources,
}

/// How an application type is laid out on a host.
#[derive(Debug, Clone, Copy)]
pub struct AppSpec {
    /// Main container image.
    pub image: &'static str,
    /// Port the application listens on inside its container.
    pub container_port: u16,
    /// Environment for the main container.
    pub env: &'static [(&'static str, &'static str)],
    /// Volume bindings for the main container.
    pub volumes: &'static [&'static str],
    /// Main container resource shares.
    pub resources: Resources,
    /// Backing database, started before the main container.
    pub database: Option<DatabaseSpec>,
}

/// Resource shares used for a database when the catalog gives none.
pub const DEFAULT_DATABASE_RESOURCES: Resources = Resources::new(1, 512);

const ODOO: AppSpec = AppSpec {
    image: "odoo:16",
    container_port: 8069,
    env: &[
        ("HOST", "db"),
        ("USER", "odoo"),
        ("PASSWORD", "myodoo"),
        ("DB_HOST", "db"),
        ("DB_PORT", "5432"),
        ("DB_USER", "odoo"),
        ("DB_PASSWORD", "myodoo"),
        ("DB_NAME", "postgres"),
    ],
    volumes: &[],
    resources: Resources::new(1, 1024),
    database: Some(DatabaseSpec {
        image: "postgres:13",
        internal_port: 5432,
        env: &[
            ("POSTGRES_DB", "postgres"),
            ("POSTGRES_PASSWORD", "myodoo"),
            ("POSTGRES_USER", "odoo"),
        ],
        resources: DEFAULT_DATABASE_RESOURCES,
    }),
};

const WORDPRESS: AppSpec = AppSpec {
    image: "wordpress:latest",
    container_port: 80,
    env: &[
        ("WORDPRESS_DB_HOST", "db"),
        ("WORDPRESS_DB_USER", "wordpress"),
        ("WORDPRESS_DB_PASSWORD", "wordpress"),
        ("WORDPRESS_DB_NAME", "wordpress"),
        ("WORDPRESS_TABLE_PREFIX", "wp_"),
    ],
    volumes: &[],
    resources: Resources::new(1, 512),
    database: Some(DatabaseSpec {
        image: "mysql:5.7",
        internal_port: 3306,
        env: &[
            ("MYSQL_DATABASE", "wordpress"),
            ("MYSQL_USER", "wordpress"),
            ("MYSQL_PASSWORD", "wordpress"),
            ("MYSQL_ROOT_PASSWORD", "somewordpress"),
            ("MYSQL_INITDB_SKIP_TZINFO", "1"),
        ],
        resources: Resources::new(1, 512),
    }),
};

const LIBREOFFICE: AppSpec = AppSpec {
    image: "collabora/code:latest",
    container_port: 9980,
    env: &[
        ("domain", "localhost"),
        ("username", "admin"),
        ("password", "S3cret"),
        ("extra_params", "--o:ssl.enable=false"),
        ("DONT_GEN_SSL_CERT", "1"),
    ],
    volumes: &[
        "/opt/cool/systemplate:/opt/cool/systemplate",
        "/opt/cool/child-roots:/opt/cool/child-roots",
    ],
    resources: Resources::new(1, 512),
    database: None,
};

const NEXTCLOUD: AppSpec = AppSpec {
    image: "nextcloud:latest",
    container_port: 80,
    env: &[
        ("MYSQL_HOST", "db"),
        ("MYSQL_DATABASE", "nextcloud"),
        ("MYSQL_USER", "nextcloud"),
        ("MYSQL_PASSWORD", "nextcloud"),
        ("NEXTCLOUD_ADMIN_USER", "admin"),
        ("NEXTCLOUD_ADMIN_PASSWORD", "admin123"),
        ("NEXTCLOUD_TRUSTED_DOMAINS", "*"),
    ],
    volumes: &[],
    resources: Resources::new(1, 1024),
    database: Some(DatabaseSpec {
        image: "mariadb:10.6",
        internal_port: 3306,
        env: &[
            ("MYSQL_ROOT_PASSWORD", "nextcloud_root"),
            ("MYSQL_DATABASE", "nextcloud"),
            ("MYSQL_USER", "nextcloud"),
            ("MYSQL_PASSWORD", "nextcloud"),
        ],
        resources: DEFAULT_DATABASE_RESOURCES,
    }),
};

/// Catalog entry for an application type.
#[must_use]
pub const fn app_spec(app: AppType) -> &'static AppSpec {
    match app {
        AppType::Odoo => &ODOO,
        AppType::Wordpress => &WORDPRESS,
        AppType::Libreoffice => &LIBREOFFICE,
        AppType::Nextcloud => &NEXTCLOUD,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_backed_types() {
        assert!(app_spec(AppType::Odoo).database.is_some());
        assert!(app_spec(AppType::Wordpress).database.is_some());
        assert!(app_spec(AppType::Nextcloud).database.is_some());
        assert!(app_spec(AppType::Libreoffice).database.is_none());
    }

    #[test]
    fn apps_with_database_reach_it_by_alias() {
        for app in AppType::ALL {
            let spec = app_spec(app);
            if spec.database.is_some() {
                assert!(
                    spec.env.iter().any(|(_, v)| *v == "db"),
                    "{app} should address its database as 'db'"
                );
            }
        }
    }

    #[test]
    fn odoo_layout() {
        let spec = app_spec(AppType::Odoo);
        assert_eq!(spec.image, "odoo:16");
        assert_eq!(spec.container_port, 8069);
        assert_eq!(spec.resources.memory.megabytes(), 1024);
        assert_eq!(spec.database.map(|db| db.image), Some("postgres:13"));
    }
}
