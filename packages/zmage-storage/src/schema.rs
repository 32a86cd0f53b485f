pub fn render_schema() -> String {
	expand_includes(include_str!("../../../sql/init.sql"))
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"tables/001_assets.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_assets.sql")),
				"tables/002_albums.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_albums.sql")),
				"tables/003_album_assets.sql" =>
					out.push_str(include_str!("../../../sql/tables/003_album_assets.sql")),
				"tables/004_collections.sql" =>
					out.push_str(include_str!("../../../sql/tables/004_collections.sql")),
				"tables/005_collection_assets.sql" =>
					out.push_str(include_str!("../../../sql/tables/005_collection_assets.sql")),
				"tables/006_tasks.sql" =>
					out.push_str(include_str!("../../../sql/tables/006_tasks.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn every_include_is_expanded() {
		let sql = render_schema();

		assert!(!sql.contains("\\ir "));

		let tables =
			["assets", "albums", "album_assets", "collections", "collection_assets", "tasks"];

		for table in tables {
			assert!(
				sql.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")),
				"Missing table {table}."
			);
		}
	}
}
