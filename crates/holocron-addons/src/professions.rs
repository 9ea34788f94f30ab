//! Profession tracker stream.

use holocron_core::{
  CharacterId,
  record::{CharacterRecord, ProfessionRecord, RecipeReference},
  sanity::{Metric, Reported, Snapshot, TelemetryRecord},
};
use holocron_lua::{Decoded, Key, Table, Value};

use crate::{
  MapContext, MapOutput, MappingError, Record, Stream,
  walk::{child_path, find_key, int_field, str_field, u32_from},
};

const PROFESSIONS: &[(&str, u32)] = &[
  ("Alchemy", 171),
  ("Blacksmithing", 164),
  ("Enchanting", 333),
  ("Engineering", 202),
  ("Herbalism", 182),
  ("Inscription", 773),
  ("Jewelcrafting", 755),
  ("Leatherworking", 165),
  ("Mining", 186),
  ("Skinning", 393),
  ("Tailoring", 197),
  ("Cooking", 185),
  ("Fishing", 356),
  ("Archaeology", 794),
  ("First Aid", 129),
];

/// Skill line id for a profession name; `0` when the name is not known.
pub fn profession_id(name: &str) -> u32 {
  lookup(name).map_or(0, |(_, id)| id)
}

fn lookup(name: &str) -> Option<(&'static str, u32)> {
  let name = name.trim();
  PROFESSIONS
    .iter()
    .copied()
    .find(|(known, _)| known.eq_ignore_ascii_case(name))
}

pub(crate) fn map(decoded: &Decoded, ctx: &MapContext, out: &mut MapOutput) {
  for (key, global) in decoded.globals.iter() {
    let path = key.to_string();
    let (root, root_path) = match find_key(global, &["_characterProfessions"]) {
      Some(v) => (v, format!("{path}._characterProfessions")),
      None => (global, path),
    };
    let Some(root) = root.as_map() else { continue };

    for (entry_key, entry) in root.iter() {
      let Some(professions) = entry.as_map() else { continue };
      let entry_path = child_path(&root_path, entry_key);
      match CharacterId::parse(&entry_key.to_string()) {
        Ok(id) => map_character(id, professions, &entry_path, ctx, out),
        Err(e) => out.fail(MappingError::new(entry_path, e.to_string())),
      }
    }
  }
}

fn map_character(
  id: CharacterId,
  professions: &Table,
  path: &str,
  ctx: &MapContext,
  out: &mut MapOutput,
) {
  out.push(Record::Character(CharacterRecord::sighting(
    id.clone(),
    ctx.observed_at,
  )));

  let mut skill_total = 0_i64;
  for (prof_key, prof) in professions.iter() {
    let prof_path = child_path(path, prof_key);
    let Some(fields) = prof.as_map() else {
      out.fail(MappingError::new(
        prof_path,
        format!("expected profession table, found {}", prof.type_name()),
      ));
      continue;
    };
    let raw_name = str_field(fields, &["name"]).unwrap_or_else(|| prof_key.to_string());
    let (name, profession_id) = match lookup(&raw_name) {
      Some((known, id)) => (known.to_owned(), id),
      None => (raw_name, 0),
    };

    let skill = int_field(fields, &["level", "skill"]).unwrap_or(0);
    let Some(skill) = u32_from(skill) else {
      out.fail(MappingError::new(prof_path, format!("invalid skill {skill}")));
      continue;
    };
    let max_skill = int_field(fields, &["maxLevel", "maxSkill"])
      .and_then(u32_from)
      .unwrap_or(skill);
    skill_total += i64::from(skill);

    out.push(Record::Profession(ProfessionRecord {
      character: id.clone(),
      profession_id,
      name: name.clone(),
      skill,
      max_skill,
      updated_at: ctx.observed_at,
    }));

    if let Some(recipes) = fields.get_ignore_case("recipes") {
      map_recipes(recipes, &name, &format!("{prof_path}.recipes"), ctx, out);
    }
  }

  out.push(Record::Telemetry(TelemetryRecord {
    character: id.to_string(),
    addon:     Stream::Professions.addon().to_owned(),
    reported:  Reported::ok(ctx.observed_at),
    snapshot:  Some(Snapshot::new().with("skill_total", Metric::Count(skill_total))),
  }));
}

/// `recipes = { [id] = "name" }` or `{ [id] = { name = "..." } }`.
fn map_recipes(
  recipes: &Value,
  profession: &str,
  path: &str,
  ctx: &MapContext,
  out: &mut MapOutput,
) {
  let entries: Vec<(Key, &Value)> = match recipes {
    Value::Map(t) => t.iter().map(|(k, v)| (k.clone(), v)).collect(),
    Value::List(items) => items
      .iter()
      .enumerate()
      .map(|(i, v)| (Key::Int(i as i64 + 1), v))
      .collect(),
    _ => Vec::new(),
  };

  for (key, value) in entries {
    let recipe_path = child_path(path, &key);
    let recipe_id = match &key {
      Key::Int(i) => u32_from(*i),
      Key::Str(s) => s.trim().parse().ok(),
    };
    let Some(recipe_id) = recipe_id else {
      out.fail(MappingError::new(recipe_path, "recipe key is not an id"));
      continue;
    };
    let name = match value {
      Value::Str(s) => Some(s.trim().to_owned()).filter(|s| !s.is_empty()),
      Value::Map(t) => str_field(t, &["name"]),
      _ => None,
    };
    let Some(name) = name else {
      out.fail(MappingError::new(recipe_path, "recipe has no name"));
      continue;
    };
    let mut recipe = RecipeReference::catalog(recipe_id, name, ctx.observed_at);
    recipe.profession = Some(profession.to_owned());
    out.push(Record::Recipe(recipe));
  }
}
