use crate::domain::labs::models::template::Template;
use std::cmp::Ordering;

const NGINX_BASIC: &str = "version: '3.8'
services:
  web:
    image: nginx:alpine
    ports:
      - \"8080:80\"
    volumes:
      - ./html:/usr/share/nginx/html
    restart: unless-stopped
    container_name: nginx-web";

const MYSQL_DB: &str = "version: '3.8'
services:
  mysql:
    image: mysql:8.0
    environment:
      MYSQL_ROOT_PASSWORD: rootpassword
      MYSQL_DATABASE: testdb
      MYSQL_USER: testuser
      MYSQL_PASSWORD: testpass
    ports:
      - \"3306:3306\"
    volumes:
      - mysql_data:/var/lib/mysql
    restart: unless-stopped

  phpmyadmin:
    image: phpmyadmin/phpmyadmin
    environment:
      PMA_HOST: mysql
      PMA_PORT: 3306
      PMA_USER: root
      PMA_PASSWORD: rootpassword
    ports:
      - \"8081:80\"
    depends_on:
      - mysql
    restart: unless-stopped

volumes:
  mysql_data:";

const REDIS_CACHE: &str = "version: '3.8'
services:
  redis:
    image: redis:alpine
    ports:
      - \"6379:6379\"
    command: redis-server --requirepass mypassword
    restart: unless-stopped

  redis-commander:
    image: rediscommander/redis-commander
    environment:
      REDIS_HOSTS: local:redis:6379
      REDIS_PASSWORD: mypassword
    ports:
      - \"8082:8081\"
    depends_on:
      - redis
    restart: unless-stopped";

const POSTGRES_DB: &str = "version: '3.8'
services:
  postgres:
    image: postgres:15
    environment:
      POSTGRES_DB: testdb
      POSTGRES_USER: testuser
      POSTGRES_PASSWORD: testpass
    ports:
      - \"5432:5432\"
    volumes:
      - postgres_data:/var/lib/postgresql/data
    restart: unless-stopped

  pgadmin:
    image: dpage/pgadmin4
    environment:
      PGADMIN_DEFAULT_EMAIL: admin@admin.com
      PGADMIN_DEFAULT_PASSWORD: admin
    ports:
      - \"8083:80\"
    depends_on:
      - postgres
    restart: unless-stopped

volumes:
  postgres_data:";

const MONITORING_STACK: &str = "version: '3.8'
services:
  prometheus:
    image: prom/prometheus
    ports:
      - \"9090:9090\"
    volumes:
      - ./prometheus.yml:/etc/prometheus/prometheus.yml
    command:
      - '--config.file=/etc/prometheus/prometheus.yml'
      - '--storage.tsdb.path=/prometheus'
    restart: unless-stopped

  grafana:
    image: grafana/grafana
    ports:
      - \"3000:3000\"
    environment:
      GF_SECURITY_ADMIN_PASSWORD: admin
    volumes:
      - grafana_data:/var/lib/grafana
    depends_on:
      - prometheus
    restart: unless-stopped

  node-exporter:
    image: prom/node-exporter
    ports:
      - \"9100:9100\"
    restart: unless-stopped

volumes:
  grafana_data:";

fn template(
    id: &str,
    name: &str,
    description: &str,
    category: &str,
    icon: &str,
    compose: &str,
) -> Template {
    Template {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        category: category.to_string(),
        icon: icon.to_string(),
        compose: compose.to_string(),
    }
}

/// Templates shipped with the crate, used when no lab API is configured.
pub fn builtin_templates() -> Vec<Template> {
    vec![
        template(
            "nginx-basic",
            "Nginx Web Server",
            "Basic Nginx web server with custom HTML",
            "Web Servers",
            "Globe",
            NGINX_BASIC,
        ),
        template(
            "mysql-db",
            "MySQL Database",
            "MySQL database with phpMyAdmin",
            "Databases",
            "Database",
            MYSQL_DB,
        ),
        template(
            "redis-cache",
            "Redis Cache",
            "Redis cache server with Redis Commander",
            "Caching",
            "Zap",
            REDIS_CACHE,
        ),
        template(
            "postgres-db",
            "PostgreSQL Database",
            "PostgreSQL with pgAdmin interface",
            "Databases",
            "Database",
            POSTGRES_DB,
        ),
        template(
            "monitoring-stack",
            "Monitoring Stack",
            "Prometheus, Grafana, and Node Exporter",
            "Monitoring",
            "Activity",
            MONITORING_STACK,
        ),
    ]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortBy {
    #[default]
    Name,
    Category,
}

/// What the template browser asks for. An empty search and no category match
/// everything.
#[derive(Debug, Clone, Default)]
pub struct TemplateQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub sort_by: SortBy,
}

pub struct TemplateCatalog {
    templates: Vec<Template>,
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::new(builtin_templates())
    }
}

impl TemplateCatalog {
    pub fn new(templates: Vec<Template>) -> Self {
        Self { templates }
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    /// Matches either the template id or its display name.
    pub fn find(&self, key: &str) -> Option<&Template> {
        self.templates
            .iter()
            .find(|t| t.id == key || t.name == key)
    }

    /// Distinct categories in first-seen order.
    pub fn categories(&self) -> Vec<&str> {
        let mut categories: Vec<&str> = Vec::new();
        for template in &self.templates {
            if !categories.contains(&template.category.as_str()) {
                categories.push(&template.category);
            }
        }
        categories
    }

    pub fn query(&self, query: &TemplateQuery) -> Vec<&Template> {
        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut matches: Vec<&Template> = self
            .templates
            .iter()
            .filter(|t| match &search {
                Some(term) => {
                    t.name.to_lowercase().contains(term)
                        || t.description.to_lowercase().contains(term)
                        || t.category.to_lowercase().contains(term)
                }
                None => true,
            })
            .filter(|t| match &query.category {
                Some(category) => &t.category == category,
                None => true,
            })
            .collect();

        matches.sort_by(|a, b| match query.sort_by {
            SortBy::Name => compare_text(&a.name, &b.name),
            SortBy::Category => compare_text(&a.category, &b.category),
        });
        matches
    }
}

fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}
